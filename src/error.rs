use thiserror::Error;

use crate::collection::CollectionError;
use crate::indexer::IngestError;
use crate::indexer::extract::ExtractError;
use crate::llm::LlmError;

/// Failures surfaced by the public operations.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid order '{0}', expected relevance, mtime_desc or hybrid")]
    InvalidOrder(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] CollectionError),

    #[error(transparent)]
    Model(#[from] LlmError),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("not found: {0}")]
    NotFound(String),
}

impl RagError {
    /// Whether the caller supplied bad input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrder(_)
                | Self::InvalidArgument(_)
                | Self::NotFound(_)
                | Self::Extraction(_)
        )
    }

    /// Whether an upstream model (embedding or language) failed.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Self::Model(_) | Self::Index(CollectionError::Embedding(_))
        )
    }
}
