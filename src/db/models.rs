use serde::Serialize;

/// A record ready to be written, borrowed from the ingestion batch.
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub record_id: &'a str,
    pub path: &'a str,
    pub mtime: f64,
    pub chunk_index: usize,
    pub content_digest: &'a str,
    pub content: &'a str,
}

/// A record as stored, without its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub record_id: String,
    pub path: String,
    pub mtime: f64,
    pub chunk_index: usize,
    pub content_digest: String,
    pub content: String,
}

/// Per-path aggregate over stored records.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSummary {
    pub path: String,
    pub mtime: f64,
    pub chunks: usize,
    pub content_digest: String,
}

/// One nearest-neighbour match.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub record: StoredRecord,
    /// Cosine distance to the query vector, in `[0, 2]`.
    pub distance: f64,
}

/// Selection for `get_records`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordFilter<'a> {
    /// Only records whose path equals this value.
    pub path: Option<&'a str>,
}
