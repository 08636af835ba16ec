//! Vector store backed by SQLite and sqlite-vec.
//!
//! Chunk records live in `records`; their embeddings live in the `vec_records`
//! virtual table under the same rowid. The embedding dimensionality is fixed
//! when the store is created and recorded in `collection_meta`.
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use thiserror::Error;
use tracing::info;

pub mod models;
pub mod records;
pub mod search;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collection_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    mtime REAL NOT NULL,
    chunk_index INTEGER NOT NULL,
    content_digest TEXT NOT NULL,
    content TEXT NOT NULL,
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_records_path ON records(path);
"#;

/// Errors raised by the store.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding dimension mismatch: store has {stored}, requested {requested}")]
    DimensionMismatch { stored: usize, requested: usize },

    #[error("{records} records but {embeddings} embeddings")]
    Misaligned { records: usize, embeddings: usize },
}

pub type Result<T> = std::result::Result<T, DbError>;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection initialized with sqlite-vec and the record schema.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing vector store: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM collection_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored.and_then(|s| s.parse::<usize>().ok()) {
            Some(stored) if stored != dimensions => {
                return Err(DbError::DimensionMismatch {
                    stored,
                    requested: dimensions,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO collection_meta (key, value) VALUES ('dimensions', ?)",
                    params![dimensions.to_string()],
                )?;
            }
        }

        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_records USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        Ok(Self { conn, dimensions })
    }

    /// Embedding dimensionality of this store.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
