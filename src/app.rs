//! Process-wide application context.
//!
//! Built once at startup and cloned into every surface (CLI, MCP, REST). All
//! clones share the same collection, so ingestion through one surface is
//! immediately visible to queries through another.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use globset::Glob;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collection::Collection;
use crate::config::Config;
use crate::db::Db;
use crate::embedder::Embedder;
use crate::error::RagError;
use crate::indexer::extract::{ExtractError, Extractor, FileExtractor};
use crate::indexer::identity::normalize_path;
use crate::indexer::{IngestStats, Indexer};
use crate::llm::ChatModel;
use crate::rag::answer::{self, AnswerOptions};
use crate::rag::rank::rank;
use crate::rag::{ChatResponse, RankOrder, SearchResponse, SearchResult, snippet};

pub const DEFAULT_PREVIEW_CHARS: usize = 800;

/// Summary of one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub mtime: f64,
    /// `mtime` as RFC 3339.
    pub modified: String,
    pub chunks: usize,
    pub content_digest: String,
    /// Size on disk, `None` once the file is gone.
    pub size: Option<u64>,
}

/// Selection for [`AppContext::list_files`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFilter {
    /// Glob matched against the normalized path, e.g. `**/*.pdf`.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub collection: String,
    pub num_records: usize,
    pub num_files: usize,
    pub embed_model: String,
    pub llm_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub path: String,
    pub preview: String,
}

#[derive(Clone)]
pub struct AppContext {
    collection: Collection,
    indexer: Indexer,
    extractor: Arc<dyn Extractor>,
    chat_model: Arc<dyn ChatModel>,
    config: Arc<Config>,
}

fn rfc3339(mtime: f64) -> String {
    DateTime::from_timestamp_millis((mtime * 1000.0).round() as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

impl AppContext {
    /// Wire the collection, indexer and models together.
    pub fn new(
        config: Config,
        db: Db,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
    ) -> Result<Self, RagError> {
        config
            .validate()
            .map_err(|e| RagError::Configuration(e.to_string()))?;

        let extractor: Arc<dyn Extractor> =
            Arc::new(FileExtractor::new(&config.supported_extensions));
        let collection = Collection::new(
            config.collection_name.clone(),
            db,
            embedder,
            config.write_batch_size,
        )?;
        let indexer = Indexer::new(
            collection.clone(),
            Arc::clone(&extractor),
            config.chunking.max_chars,
            config.chunking.overlap,
        )?;

        info!(
            "Collection '{}' ready with {} as language model",
            collection.name(),
            chat_model.model_name()
        );

        Ok(Self {
            collection,
            indexer,
            extractor,
            chat_model,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    fn resolve_k(&self, k: Option<usize>) -> Result<usize, RagError> {
        match k.unwrap_or(self.config.search.top_k) {
            0 => Err(RagError::InvalidArgument("k must be positive".to_string())),
            k => Ok(k),
        }
    }

    fn check_query(query: &str) -> Result<(), RagError> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidArgument("query must not be empty".to_string()));
        }
        Ok(())
    }

    /// Ingest files and directories.
    pub async fn ingest<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IngestStats, RagError> {
        Ok(self.indexer.ingest(paths).await?)
    }

    /// Semantic search. Over-fetches `k * overfetch` candidates, ranks them by
    /// `order`, then truncates to `k`.
    pub async fn search(
        &self,
        query: &str,
        k: Option<usize>,
        order: RankOrder,
    ) -> Result<SearchResponse, RagError> {
        Self::check_query(query)?;
        let k = self.resolve_k(k)?;
        let candidates = k.saturating_mul(self.config.search.overfetch);

        let snippet_chars = self.config.search.snippet_chars;
        let hits = self.collection.query(query, candidates).await?;
        let results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| SearchResult {
                path: hit.path,
                score: hit.distance,
                snippet: snippet(&hit.text, snippet_chars),
                mtime: hit.mtime,
            })
            .collect();

        let mut results = rank(results, order);
        results.truncate(k);

        Ok(SearchResponse {
            query: query.to_string(),
            results,
        })
    }

    /// Retrieve `top_k` passages and ask the language model to answer from
    /// them. Citations follow the order of the passages handed to the model.
    pub async fn chat(
        &self,
        query: &str,
        top_k: Option<usize>,
        order: RankOrder,
    ) -> Result<ChatResponse, RagError> {
        Self::check_query(query)?;
        let k = self.resolve_k(top_k)?;
        let candidates = k.saturating_mul(self.config.search.overfetch);

        let mut hits = rank(self.collection.query(query, candidates).await?, order);
        hits.truncate(k);

        let contexts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        let options = AnswerOptions {
            temperature: self.config.llm.temperature,
            max_tokens: self.config.llm.max_tokens,
            language: self.config.llm.answer_language.clone(),
        };
        let answer = answer::answer(self.chat_model.as_ref(), query, &contexts, &options).await?;

        let snippet_chars = self.config.search.snippet_chars;
        let citations = hits
            .iter()
            .map(|hit| SearchResult {
                path: hit.path.clone(),
                score: hit.distance,
                snippet: snippet(&hit.text, snippet_chars),
                mtime: hit.mtime,
            })
            .collect();

        Ok(ChatResponse { answer, citations })
    }

    /// Remove a document from the index. Unknown paths remove nothing.
    pub async fn delete(&self, path: &str) -> Result<usize, RagError> {
        if path.trim().is_empty() {
            return Err(RagError::InvalidArgument("path must not be empty".to_string()));
        }
        Ok(self.indexer.delete(path).await?)
    }

    /// Drop every record. Returns how many were deleted.
    pub async fn reset(&self) -> Result<usize, RagError> {
        let removed = self.collection.reset().await?;
        info!("Reset collection '{}': {removed} records deleted", self.collection.name());
        Ok(removed)
    }

    /// Indexed files, newest first.
    pub async fn list_files(&self, filter: &FileFilter) -> Result<Vec<FileSummary>, RagError> {
        let matcher = match filter.pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|e| RagError::InvalidArgument(format!("invalid pattern: {e}")))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let mut files: Vec<FileSummary> = self
            .collection
            .files()
            .await?
            .into_iter()
            .filter(|s| matcher.as_ref().is_none_or(|m| m.is_match(&s.path)))
            .map(|s| FileSummary {
                size: std::fs::metadata(&s.path).ok().map(|m| m.len()),
                modified: rfc3339(s.mtime),
                path: s.path,
                mtime: s.mtime,
                chunks: s.chunks,
                content_digest: s.content_digest,
            })
            .collect();

        files.sort_by(|a, b| b.mtime.total_cmp(&a.mtime));
        if let Some(limit) = filter.limit {
            files.truncate(limit);
        }
        Ok(files)
    }

    pub async fn stats(&self) -> Result<IndexStats, RagError> {
        Ok(IndexStats {
            collection: self.collection.name().to_string(),
            num_records: self.collection.count().await?,
            num_files: self.collection.files().await?.len(),
            embed_model: self.config.model.name.clone(),
            llm_model: self.chat_model.model_name().to_string(),
        })
    }

    /// First `nchars` characters of a document's extracted text.
    pub async fn preview(&self, path: &str, nchars: Option<usize>) -> Result<Preview, RagError> {
        let nchars = nchars.unwrap_or(DEFAULT_PREVIEW_CHARS);
        let file = PathBuf::from(path);

        if !file.is_file() {
            return Err(RagError::NotFound(path.to_string()));
        }
        if !self.extractor.supports(&file) {
            return Err(ExtractError::UnsupportedFormat(path.to_string()).into());
        }

        let extractor = Arc::clone(&self.extractor);
        let text = tokio::task::spawn_blocking(move || extractor.extract(&file))
            .await
            .map_err(|e| RagError::Configuration(format!("preview task failed: {e}")))??;

        Ok(Preview {
            path: normalize_path(Path::new(path)),
            preview: text.chars().take(nchars).collect(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedder::mock::{FailingEmbedder, MockEmbedder};
    use crate::rag::answer::tests::ScriptedModel;
    use std::fs;
    use tempfile::tempdir;

    pub(crate) fn test_context(model: Arc<dyn ChatModel>) -> AppContext {
        test_context_with(Arc::new(MockEmbedder::new(16)), model)
    }

    fn test_context_with(embedder: Arc<dyn Embedder>, model: Arc<dyn ChatModel>) -> AppContext {
        let mut config = Config::default();
        config.model.dimensions = embedder.dimensions();
        config.chunking.max_chars = 100;
        config.chunking.overlap = 20;
        let db = Db::open_in_memory(embedder.dimensions()).unwrap();
        AppContext::new(config, db, embedder, model).unwrap()
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(rfc3339(0.0), "1970-01-01T00:00:00Z");
        assert_eq!(rfc3339(86_400.4), "1970-01-02T00:00:00Z");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.model.dimensions = 8;
        config.write_batch_size = 0;
        let db = Db::open_in_memory(8).unwrap();
        let result = AppContext::new(
            config,
            db,
            Arc::new(MockEmbedder::new(8)),
            Arc::new(ScriptedModel::replying("x")),
        );
        assert!(matches!(result.err(), Some(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_search_validates_input() {
        let ctx = test_context(Arc::new(ScriptedModel::replying("x")));
        let err = ctx.search("   ", None, RankOrder::Relevance).await.unwrap_err();
        assert!(err.is_client_error());
        let err = ctx.search("q", Some(0), RankOrder::Relevance).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_search_empty_corpus() {
        let ctx = test_context_with(
            Arc::new(FailingEmbedder { dimensions: 16 }),
            Arc::new(ScriptedModel::replying("x")),
        );
        let response = ctx.search("anything", Some(5), RankOrder::Hybrid).await.unwrap();
        assert_eq!(response.query, "anything");
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_chat_passes_contexts_and_cites() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha facts").unwrap();
        fs::write(dir.path().join("b.txt"), "beta facts").unwrap();

        let model = Arc::new(ScriptedModel::replying("  Alpha is first. "));
        let ctx = test_context(model.clone());
        ctx.ingest(&[dir.path()]).await.unwrap();

        let response = ctx.chat("alpha facts", Some(1), RankOrder::Relevance).await.unwrap();
        assert_eq!(response.answer, "Alpha is first.");
        assert_eq!(response.citations.len(), 1);
        assert!(response.citations[0].path.ends_with("/a.txt"));
        assert!(response.citations[0].score.abs() < 1e-4);

        let requests = model.requests.lock().unwrap();
        assert!(requests[0].user.contains("[CONTEXT 1]\nalpha facts"));
        assert!(!requests[0].user.contains("[CONTEXT 2]"));
    }

    #[tokio::test]
    async fn test_chat_model_failure_is_model_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let ctx = test_context(Arc::new(ScriptedModel::failing("down")));
        ctx.ingest(&[dir.path()]).await.unwrap();

        let err = ctx.chat("alpha", None, RankOrder::Relevance).await.unwrap_err();
        assert!(err.is_model_error());
    }

    #[tokio::test]
    async fn test_list_files_filter_and_order() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.md");
        let new = dir.path().join("new.txt");
        fs::write(&old, "old notes").unwrap();
        fs::write(&new, "new notes").unwrap();
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let ctx = test_context(Arc::new(ScriptedModel::replying("x")));
        ctx.ingest(&[dir.path()]).await.unwrap();

        let all = ctx.list_files(&FileFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].path.ends_with("/new.txt"));
        assert!(all[1].path.ends_with("/old.md"));
        assert_eq!(all[0].size, Some(9));
        assert!(all[0].modified.ends_with('Z'));

        let md = ctx
            .list_files(&FileFilter {
                pattern: Some("**/*.md".to_string()),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(md.len(), 1);
        assert_eq!(md[0].chunks, 1);

        let limited = ctx
            .list_files(&FileFilter {
                pattern: None,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let bad = ctx
            .list_files(&FileFilter {
                pattern: Some("[".to_string()),
                limit: None,
            })
            .await;
        assert!(matches!(bad, Err(RagError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_stats_and_preview() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.md");
        fs::write(&file, "line one\nline two").unwrap();

        let ctx = test_context(Arc::new(ScriptedModel::replying("x")));
        ctx.ingest(&[&file]).await.unwrap();

        let stats = ctx.stats().await.unwrap();
        assert_eq!(stats.collection, "documents");
        assert_eq!(stats.num_records, 1);
        assert_eq!(stats.num_files, 1);
        assert_eq!(stats.llm_model, "scripted");

        let preview = ctx.preview(file.to_str().unwrap(), Some(4)).await.unwrap();
        assert_eq!(preview.preview, "line");

        let missing = ctx.preview("/no/such/file.md", None).await.unwrap_err();
        assert!(matches!(missing, RagError::NotFound(_)));

        let other = dir.path().join("image.png");
        fs::write(&other, "png").unwrap();
        let unsupported = ctx.preview(other.to_str().unwrap(), None).await.unwrap_err();
        assert!(unsupported.is_client_error());
    }

    #[tokio::test]
    async fn test_delete_and_reset() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "some text").unwrap();

        let ctx = test_context(Arc::new(ScriptedModel::replying("x")));
        ctx.ingest(&[&file]).await.unwrap();

        assert!(matches!(ctx.delete(" ").await, Err(RagError::InvalidArgument(_))));
        assert_eq!(ctx.delete(file.to_str().unwrap()).await.unwrap(), 1);
        assert_eq!(ctx.delete(file.to_str().unwrap()).await.unwrap(), 0);

        ctx.ingest(&[&file]).await.unwrap();
        assert_eq!(ctx.reset().await.unwrap(), 1);
        assert_eq!(ctx.stats().await.unwrap().num_records, 0);
    }
}
