use crate::collection::{Collection, CollectionError};
use crate::indexer::chunker::{ChunkError, chunk_windows};
use crate::indexer::extract::{ExtractError, Extractor};
use crate::indexer::identity::{self, FileIdentity, IndexRecord};
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Counters returned by an ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Files whose chunks were committed to the index.
    pub files_ingested: usize,
    /// Chunks committed across those files.
    pub chunks_ingested: usize,
    /// Unsupported, missing, unreadable, empty or failed-to-write inputs.
    pub files_skipped: usize,
}

/// Fatal ingestion errors. Per-file problems are never surfaced here; they
/// are counted in [`IngestStats::files_skipped`].
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// A file that went through extraction and chunking, waiting to be written.
#[derive(Debug)]
struct PendingFile {
    path: String,
    records: Vec<IndexRecord>,
}

/// Everything read from disk for one file.
struct LoadedFile {
    text: String,
    mtime: f64,
    content_digest: String,
}

#[derive(Error, Debug)]
enum LoadError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("failed to read {0}")]
    Io(#[from] std::io::Error),
}

fn load_file(extractor: &dyn Extractor, path: &Path) -> Result<LoadedFile, LoadError> {
    let text = extractor.extract(path)?;
    let mtime = std::fs::metadata(path)?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let content_digest = identity::content_digest(path)?;

    Ok(LoadedFile {
        text,
        mtime,
        content_digest,
    })
}

/// Walks input paths, chunks their text and replaces their records in the
/// collection.
#[derive(Clone)]
pub struct Indexer {
    collection: Collection,
    extractor: Arc<dyn Extractor>,
    max_chars: usize,
    overlap: usize,
}

impl Indexer {
    /// Build an indexer. Fails if the chunking parameters are unusable.
    pub fn new(
        collection: Collection,
        extractor: Arc<dyn Extractor>,
        max_chars: usize,
        overlap: usize,
    ) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(ChunkError::InvalidConfiguration("max_chars must be > 0".to_string()).into());
        }

        Ok(Self {
            collection,
            extractor,
            max_chars,
            overlap,
        })
    }

    /// Collect the candidate files for a run.
    ///
    /// Directories are walked recursively (hidden and git-ignored files
    /// included) and only supported files inside them are considered. An
    /// explicitly named file that is unsupported, or a path that does not
    /// exist, counts as skipped.
    fn expand_inputs<P: AsRef<Path>>(&self, paths: &[P], stats: &mut IngestStats) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut push = |path: PathBuf, files: &mut Vec<PathBuf>| {
            if seen.insert(identity::normalize_path(&path)) {
                files.push(path);
            }
        };

        for input in paths {
            let input = input.as_ref();

            if input.is_dir() {
                let walker = WalkBuilder::new(input).standard_filters(false).build();
                for entry in walker {
                    let entry = match entry {
                        Ok(e) => e,
                        Err(e) => {
                            warn!("Walk error under {}: {e}", input.display());
                            continue;
                        }
                    };
                    let path = entry.path();
                    if path.is_file() && self.extractor.supports(path) {
                        push(path.to_path_buf(), &mut files);
                    }
                }
            } else if input.is_file() {
                if self.extractor.supports(input) {
                    push(input.to_path_buf(), &mut files);
                } else {
                    debug!("Skipping unsupported file {}", input.display());
                    stats.files_skipped += 1;
                }
            } else {
                warn!("Skipping missing path {}", input.display());
                stats.files_skipped += 1;
            }
        }

        files
    }

    /// Read, chunk and identify one file. `None` means the file is skipped.
    async fn prepare_file(&self, path: PathBuf) -> Option<PendingFile> {
        let key = identity::normalize_path(&path);
        let extractor = Arc::clone(&self.extractor);

        let loaded = tokio::task::spawn_blocking(move || load_file(extractor.as_ref(), &path)).await;
        let loaded = match loaded {
            Ok(Ok(l)) => l,
            Ok(Err(e)) => {
                warn!("Skipping {key}: {e}");
                return None;
            }
            Err(e) => {
                warn!("Skipping {key}: extraction task failed: {e}");
                return None;
            }
        };

        // max_chars was validated at construction time
        let chunks = chunk_windows(&loaded.text, self.max_chars, self.overlap).unwrap_or_default();
        let file_identity = FileIdentity::new(&key, loaded.content_digest);
        let records = file_identity.build_records(loaded.mtime, chunks);

        Some(PendingFile { path: key, records })
    }

    /// Ingest files and directories, replacing any records previously stored
    /// for the same paths.
    pub async fn ingest<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();
        let files = self.expand_inputs(paths, &mut stats);
        info!("Ingesting {} files", files.len());

        let mut pending = Vec::with_capacity(files.len());
        for path in files {
            match self.prepare_file(path).await {
                Some(file) => {
                    if file.records.is_empty() {
                        debug!("No text in {}, clearing stale records", file.path);
                        stats.files_skipped += 1;
                    }
                    pending.push(file);
                }
                None => stats.files_skipped += 1,
            }
        }

        self.flush(pending, &mut stats).await;

        info!(
            "Ingestion done: {} files, {} chunks, {} skipped",
            stats.files_ingested, stats.chunks_ingested, stats.files_skipped
        );
        Ok(stats)
    }

    /// Embed the whole write set in fixed-size slices that may span files,
    /// then commit each file with one atomic replacement.
    async fn flush(&self, pending: Vec<PendingFile>, stats: &mut IngestStats) {
        let batch_size = self.collection.batch_size();

        // (file index, record index) for every queued record, in order
        let positions: Vec<(usize, usize)> = pending
            .iter()
            .enumerate()
            .flat_map(|(f, file)| (0..file.records.len()).map(move |r| (f, r)))
            .collect();

        let mut embeddings: Vec<Vec<Vec<f32>>> = pending
            .iter()
            .map(|f| Vec::with_capacity(f.records.len()))
            .collect();
        let mut failed = vec![false; pending.len()];

        for slice in positions.chunks(batch_size) {
            let texts: Vec<String> = slice
                .iter()
                .map(|&(f, r)| pending[f].records[r].text.clone())
                .collect();

            match self.collection.embed(texts).await {
                Ok(vectors) => {
                    for (&(f, _), vector) in slice.iter().zip(vectors) {
                        embeddings[f].push(vector);
                    }
                }
                Err(e) => {
                    warn!("Embedding batch of {} failed: {e}", slice.len());
                    for &(f, _) in slice {
                        failed[f] = true;
                    }
                }
            }
        }

        for ((file, vectors), failed) in pending.iter().zip(embeddings).zip(failed) {
            let has_chunks = !file.records.is_empty();
            if failed {
                stats.files_skipped += 1;
                continue;
            }

            match self
                .collection
                .replace_embedded(&file.path, &file.records, &vectors)
                .await
            {
                Ok(_) if has_chunks => {
                    stats.files_ingested += 1;
                    stats.chunks_ingested += file.records.len();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to write {}: {e}", file.path);
                    if has_chunks {
                        stats.files_skipped += 1;
                    }
                }
            }
        }
    }

    /// Remove a path from the index. Returns the number of records deleted.
    pub async fn delete<P: AsRef<Path>>(&self, path: P) -> Result<usize, CollectionError> {
        let key = identity::normalize_path(path.as_ref());
        self.collection.delete_path(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::db::models::RecordFilter;
    use crate::embedder::mock::{FailingEmbedder, MockEmbedder};
    use crate::embedder::{Embedder, EmbedderError};
    use crate::indexer::extract::FileExtractor;
    use std::fs;
    use tempfile::tempdir;

    /// Fails any batch that contains `marker`, embeds everything else.
    struct MarkerEmbedder {
        inner: MockEmbedder,
        marker: &'static str,
    }

    impl Embedder for MarkerEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.embed_batch(&[text]).map(|mut v| v.remove(0))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            if texts.iter().any(|t| t.contains(self.marker)) {
                return Err(EmbedderError::InferenceFailed("rejected batch".to_string()));
            }
            self.inner.embed_batch(texts)
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions
        }
    }

    fn indexer_with(embedder: Arc<dyn Embedder>, batch_size: usize) -> (Indexer, Collection) {
        let db = Db::open_in_memory(embedder.dimensions()).unwrap();
        let collection = Collection::new("test", db, embedder, batch_size).unwrap();
        let indexer = Indexer::new(
            collection.clone(),
            Arc::new(FileExtractor::default()),
            1200,
            200,
        )
        .unwrap();
        (indexer, collection)
    }

    #[test]
    fn test_zero_max_chars_is_fatal() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(8));
        let db = Db::open_in_memory(8).unwrap();
        let collection = Collection::new("c", db, embedder, 100).unwrap();
        let result = Indexer::new(collection, Arc::new(FileExtractor::default()), 0, 0);
        assert!(matches!(
            result.err(),
            Some(IngestError::Chunk(ChunkError::InvalidConfiguration(_)))
        ));
    }

    #[tokio::test]
    async fn test_ingest_counts() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir_all(docs.join("nested")).unwrap();
        fs::write(docs.join("a.txt"), "x".repeat(3000)).unwrap();
        fs::write(docs.join("nested/b.md"), "y".repeat(500)).unwrap();
        fs::write(docs.join("empty.txt"), "").unwrap();
        fs::write(docs.join("image.png"), "not text").unwrap();
        let lone = dir.path().join("data.csv");
        fs::write(&lone, "a,b").unwrap();

        let (indexer, collection) = indexer_with(Arc::new(MockEmbedder::new(8)), 100);
        let stats = indexer
            .ingest(&[docs.clone(), lone, dir.path().join("missing")])
            .await
            .unwrap();

        assert_eq!(
            stats,
            IngestStats {
                files_ingested: 2,
                chunks_ingested: 4,
                // empty.txt + data.csv + missing; image.png inside a walk is ignored
                files_skipped: 3,
            }
        );
        assert_eq!(collection.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_reingest_replaces_content() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "first version ".repeat(300)).unwrap();

        let (indexer, collection) = indexer_with(Arc::new(MockEmbedder::new(8)), 100);
        let first = indexer.ingest(&[&file]).await.unwrap();
        assert!(first.chunks_ingested > 1);

        fs::write(&file, "second").unwrap();
        let second = indexer.ingest(&[&file]).await.unwrap();
        assert_eq!(second.chunks_ingested, 1);

        let stored = collection.get(RecordFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "second");
    }

    #[tokio::test]
    async fn test_emptied_file_clears_old_records() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.md");
        fs::write(&file, "some content").unwrap();

        let (indexer, collection) = indexer_with(Arc::new(MockEmbedder::new(8)), 100);
        indexer.ingest(&[&file]).await.unwrap();
        assert_eq!(collection.count().await.unwrap(), 1);

        fs::write(&file, "").unwrap();
        let stats = indexer.ingest(&[&file]).await.unwrap();
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.files_ingested, 0);
        assert_eq!(collection.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batches_span_files() {
        let dir = tempdir().unwrap();
        for i in 0..4 {
            // 3 chunks each at max_chars=1200, overlap=200
            fs::write(dir.path().join(format!("f{i}.txt")), "z".repeat(3000)).unwrap();
        }

        let embedder = Arc::new(MockEmbedder::new(8));
        let (indexer, collection) = indexer_with(embedder.clone(), 5);
        let stats = indexer.ingest(&[dir.path()]).await.unwrap();

        assert_eq!(stats.files_ingested, 4);
        assert_eq!(stats.chunks_ingested, 12);
        assert_eq!(collection.count().await.unwrap(), 12);
        // 12 records in slices of 5 -> 5, 5, 2
        assert_eq!(embedder.batch_calls(), 3);
        assert_eq!(embedder.largest_batch(), 5);
    }

    #[tokio::test]
    async fn test_embedding_failure_counts_as_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::write(dir.path().join("b.txt"), "world").unwrap();

        let (indexer, collection) = indexer_with(Arc::new(FailingEmbedder { dimensions: 8 }), 100);
        let stats = indexer.ingest(&[dir.path()]).await.unwrap();

        assert_eq!(stats.files_ingested, 0);
        assert_eq!(stats.files_skipped, 2);
        assert_eq!(collection.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_inputs_processed_once() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "abc").unwrap();

        let (indexer, _) = indexer_with(Arc::new(MockEmbedder::new(8)), 100);
        let stats = indexer
            .ingest(&[file.clone(), file, dir.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(stats.files_ingested, 1);
        assert_eq!(stats.chunks_ingested, 1);
    }

    #[tokio::test]
    async fn test_delete_uses_normalized_path() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "abc").unwrap();

        let (indexer, collection) = indexer_with(Arc::new(MockEmbedder::new(8)), 100);
        indexer.ingest(&[&file]).await.unwrap();
        assert_eq!(indexer.delete(&file).await.unwrap(), 1);
        assert_eq!(indexer.delete(&file).await.unwrap(), 0);
        assert_eq!(collection.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_file_does_not_block_others() {
        let dir = tempdir().unwrap();
        let keep = dir.path().join("keep.txt");
        let bad = dir.path().join("bad.txt");
        fs::write(&keep, "kept from an earlier run").unwrap();
        fs::write(&bad, "clean first version").unwrap();

        let embedder = Arc::new(MarkerEmbedder {
            inner: MockEmbedder::new(8),
            marker: "POISON",
        });
        // One single-chunk file per embedding slice
        let (indexer, collection) = indexer_with(embedder, 1);
        let first = indexer.ingest(&[&keep, &bad]).await.unwrap();
        assert_eq!(first.files_ingested, 2);

        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "alpha").unwrap();
        fs::write(&b, "beta").unwrap();
        fs::write(&bad, "POISON second version").unwrap();

        let stats = indexer.ingest(&[&a, &bad, &b]).await.unwrap();
        assert_eq!(
            stats,
            IngestStats {
                files_ingested: 2,
                chunks_ingested: 2,
                files_skipped: 1,
            }
        );

        let stored = collection.get(RecordFilter::default()).await.unwrap();
        let mut contents: Vec<&str> = stored.iter().map(|r| r.content.as_str()).collect();
        contents.sort_unstable();
        // keep.txt untouched, bad.txt still holds its last committed version
        assert_eq!(
            contents,
            vec!["alpha", "beta", "clean first version", "kept from an earlier run"]
        );
    }

    #[tokio::test]
    async fn test_aliased_path_shares_document_key() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let file = dir.path().join("a.txt");
        let aliased = dir.path().join("sub").join("..").join("a.txt");
        fs::write(&file, "first").unwrap();

        let (indexer, collection) = indexer_with(Arc::new(MockEmbedder::new(8)), 100);
        indexer.ingest(&[&aliased]).await.unwrap();

        fs::write(&file, "second").unwrap();
        let stats = indexer.ingest(&[&file, &aliased]).await.unwrap();
        assert_eq!(stats.files_ingested, 1);

        let files = collection.files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].path.contains(".."));
        let stored = collection.get(RecordFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "second");

        assert_eq!(indexer.delete(&aliased).await.unwrap(), 1);
        assert_eq!(collection.count().await.unwrap(), 0);
    }
}
