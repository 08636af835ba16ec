//! The process-wide document collection.
//!
//! A [`Collection`] binds an [`Embedder`] to the vector store. Callers hand it
//! text; it embeds, stores and queries transparently. Embedding runs on the
//! blocking thread pool so async callers are never stalled by inference.
//!
//! The store sits behind one async mutex. Every per-path replacement is a
//! single SQLite transaction taken under that mutex, so a reader can never
//! observe a path with its old records deleted but the new ones not yet
//! written.
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use crate::db::models::{NewRecord, PathSummary, RecordFilter, StoredRecord};
use crate::db::{Db, DbError};
use crate::embedder::{Embedder, EmbedderError};
use crate::indexer::identity::IndexRecord;

/// Documented default cap on records written (and texts embedded) per call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors raised by collection operations.
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("index store error: {0}")]
    Store(#[from] DbError),

    #[error("batch of {len} exceeds the write cap of {cap}")]
    BatchTooLarge { len: usize, cap: usize },

    #[error("embedder returned {embeddings} vectors for {texts} texts")]
    Misaligned { texts: usize, embeddings: usize },

    #[error("record for {found} passed to replacement of {expected}")]
    ForeignRecord { expected: String, found: String },

    #[error("embedder dimension {embedder} does not match store dimension {store}")]
    DimensionMismatch { embedder: usize, store: usize },

    #[error("background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CollectionError>;

/// One query match, closest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub path: String,
    pub text: String,
    pub mtime: f64,
    pub chunk_index: usize,
    pub content_digest: String,
    /// Cosine distance; lower is more relevant.
    pub distance: f64,
}

/// Vector index adapter: store + bound embedding function.
#[derive(Clone)]
pub struct Collection {
    name: Arc<str>,
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

fn as_new_records(records: &[IndexRecord]) -> Vec<NewRecord<'_>> {
    records
        .iter()
        .map(|r| NewRecord {
            record_id: &r.id,
            path: &r.metadata.path,
            mtime: r.metadata.mtime,
            chunk_index: r.metadata.chunk_index,
            content_digest: &r.metadata.content_digest,
            content: &r.text,
        })
        .collect()
}

impl Collection {
    /// Bind `embedder` to `db`. The embedder's dimensionality must match the
    /// store's.
    pub fn new(
        name: impl Into<String>,
        db: Db,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        if embedder.dimensions() != db.dimensions() {
            return Err(CollectionError::DimensionMismatch {
                embedder: embedder.dimensions(),
                store: db.dimensions(),
            });
        }

        Ok(Self {
            name: Arc::from(name.into()),
            db: Arc::new(TokioMutex::new(db)),
            embedder,
            batch_size: batch_size.max(1),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of records per write and texts per embedding call.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn check_cap(&self, len: usize) -> Result<()> {
        if len > self.batch_size {
            return Err(CollectionError::BatchTooLarge {
                len,
                cap: self.batch_size,
            });
        }
        Ok(())
    }

    /// Embed up to `batch_size` texts with the bound embedding function.
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.check_cap(texts.len())?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let expected = texts.len();
        let vectors = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        })
        .await
        .map_err(|e| CollectionError::Task(e.to_string()))??;

        if vectors.len() != expected {
            return Err(CollectionError::Misaligned {
                texts: expected,
                embeddings: vectors.len(),
            });
        }
        Ok(vectors)
    }

    /// Embed and insert up to `batch_size` records. Existing records with the
    /// same id are overwritten.
    ///
    /// The cap bounds one embedding call. Whole-file writes go through
    /// [`Collection::replace`] or [`Collection::replace_embedded`], which embed
    /// in capped slices but commit a file of any size in one transaction.
    pub async fn add(&self, records: &[IndexRecord]) -> Result<()> {
        self.check_cap(records.len())?;
        let vectors = self
            .embed(records.iter().map(|r| r.text.clone()).collect())
            .await?;

        let mut db = self.db.lock().await;
        db.insert_records(&as_new_records(records), &vectors)?;
        Ok(())
    }

    /// Atomically replace the records of `path` with pre-embedded `records`.
    ///
    /// Returns how many old records were removed. An empty `records` slice
    /// just clears the path. No `batch_size` cap applies here: the vectors
    /// were already produced by capped [`Collection::embed`] calls.
    pub async fn replace_embedded(
        &self,
        path: &str,
        records: &[IndexRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if let Some(foreign) = records.iter().find(|r| r.metadata.path != path) {
            return Err(CollectionError::ForeignRecord {
                expected: path.to_string(),
                found: foreign.metadata.path.clone(),
            });
        }
        if records.len() != embeddings.len() {
            return Err(CollectionError::Misaligned {
                texts: records.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut db = self.db.lock().await;
        let removed = db.replace_path(path, &as_new_records(records), embeddings)?;
        debug!(
            "Replaced {path}: {removed} old records, {} new",
            records.len()
        );
        Ok(removed)
    }

    /// Embed `records` in `batch_size` slices, then atomically replace the
    /// records of `path` with them.
    pub async fn replace(&self, path: &str, records: &[IndexRecord]) -> Result<usize> {
        let mut vectors = Vec::with_capacity(records.len());
        for slice in records.chunks(self.batch_size) {
            vectors.extend(
                self.embed(slice.iter().map(|r| r.text.clone()).collect())
                    .await?,
            );
        }
        self.replace_embedded(path, records, &vectors).await
    }

    /// The `k` records nearest to `text`, closest first.
    ///
    /// An empty collection (or `k == 0`) yields no hits without calling the
    /// embedder.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embed(vec![text.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let db = self.db.lock().await;
        let rows = db.query(&query_vector, k)?;

        Ok(rows
            .into_iter()
            .map(|row| QueryHit {
                id: row.record.record_id,
                path: row.record.path,
                text: row.record.content,
                mtime: row.record.mtime,
                chunk_index: row.record.chunk_index,
                content_digest: row.record.content_digest,
                distance: row.distance,
            })
            .collect())
    }

    /// Delete every record of `path`. Unknown paths are a no-op.
    pub async fn delete_path(&self, path: &str) -> Result<usize> {
        let mut db = self.db.lock().await;
        Ok(db.delete_path(path)?)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        Ok(db.count()?)
    }

    /// All records matching `filter`.
    pub async fn get(&self, filter: RecordFilter<'_>) -> Result<Vec<StoredRecord>> {
        let db = self.db.lock().await;
        Ok(db.get_records(filter)?)
    }

    /// One summary per indexed path.
    pub async fn files(&self) -> Result<Vec<PathSummary>> {
        let db = self.db.lock().await;
        Ok(db.path_summaries()?)
    }

    /// Delete everything. Returns the number of records removed.
    pub async fn reset(&self) -> Result<usize> {
        let mut db = self.db.lock().await;
        Ok(db.reset()?)
    }
}
