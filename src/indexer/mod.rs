//! Document ingestion: extraction, chunking, record identity and the
//! orchestrator that writes everything into the collection.
pub mod chunker;
pub mod core;
pub mod extract;
pub mod identity;

pub use self::core::{IngestError, IngestStats, Indexer};
