/// Stable identifiers for indexed chunks.
///
/// A record id is built from three parts:
/// - the SHA-256 of the whole file's bytes (content identity),
/// - a truncated SHA-256 of the normalized path (so identical content in two
///   files never collides),
/// - the chunk's index within the file.
///
/// The digest is stored as metadata only. Re-ingesting a path always replaces
/// its records, even when the content is unchanged.
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunker::TextChunk;

/// Number of hex characters kept from the path hash.
const PATH_DIGEST_LEN: usize = 16;

/// Metadata persisted next to every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub path: String,
    pub mtime: f64,
    pub chunk_index: usize,
    pub content_digest: String,
}

/// The persisted unit of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// Identity of one file at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub path: String,
    pub content_digest: String,
    pub path_digest: String,
}

impl FileIdentity {
    /// Build an identity from an already normalized path and a content digest.
    #[must_use]
    pub fn new(path: &str, content_digest: String) -> Self {
        Self {
            path: path.to_string(),
            path_digest: path_digest(path),
            content_digest,
        }
    }

    /// Record id for the chunk at `chunk_index`.
    #[must_use]
    pub fn record_id(&self, chunk_index: usize) -> String {
        record_id(&self.content_digest, &self.path_digest, chunk_index)
    }

    /// Turn a file's chunks into index records.
    #[must_use]
    pub fn build_records(&self, mtime: f64, chunks: Vec<TextChunk>) -> Vec<IndexRecord> {
        chunks
            .into_iter()
            .map(|c| IndexRecord {
                id: self.record_id(c.index),
                text: c.text,
                metadata: RecordMetadata {
                    path: self.path.clone(),
                    mtime,
                    chunk_index: c.index,
                    content_digest: self.content_digest.clone(),
                },
            })
            .collect()
    }
}

/// `"{content_digest}:{path_digest}:{chunk_index}"`
#[must_use]
pub fn record_id(content_digest: &str, path_digest: &str, chunk_index: usize) -> String {
    format!("{content_digest}:{path_digest}:{chunk_index}")
}

/// SHA-256 (hex) of a file's raw bytes, read in 8 KiB blocks.
pub fn content_digest<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Truncated SHA-256 (hex) of a path string.
#[must_use]
pub fn path_digest(path: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(path.as_bytes()));
    digest[..PATH_DIGEST_LEN].to_string()
}

/// Canonical absolute path with forward slashes, used as the document key.
///
/// Existing files resolve through `fs::canonicalize`, so `..` segments and
/// symlinks collapse to one key. A path that no longer exists (e.g. deleting
/// a removed file) resolves its parent directory when possible and is
/// otherwise cleaned lexically.
#[must_use]
pub fn normalize_path(path: &Path) -> String {
    let key = std::fs::canonicalize(path).unwrap_or_else(|_| resolve_missing(path));
    key.to_string_lossy().replace('\\', "/")
}

fn resolve_missing(path: &Path) -> PathBuf {
    let abs = lexical_clean(&std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
    match (abs.parent(), abs.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(dir) => dir.join(name),
            Err(_) => abs,
        },
        _ => abs,
    }
}

/// Drops `.` and folds `..` without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
