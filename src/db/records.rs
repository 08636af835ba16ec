use super::{Db, DbError, Result, models::*, serialize_vector};
use rusqlite::{Connection, params};

/// Remove every record (and its vector) stored for `path`.
fn delete_path_in(conn: &Connection, path: &str) -> Result<usize> {
    // Virtual tables do not take part in foreign-key cascades
    conn.execute(
        "DELETE FROM vec_records WHERE rowid IN (SELECT id FROM records WHERE path = ?)",
        params![path],
    )?;
    Ok(conn.execute("DELETE FROM records WHERE path = ?", params![path])?)
}

/// Insert records and their vectors, replacing any record with the same id.
fn insert_in(conn: &Connection, records: &[NewRecord<'_>], embeddings: &[Vec<f32>]) -> Result<()> {
    if records.len() != embeddings.len() {
        return Err(DbError::Misaligned {
            records: records.len(),
            embeddings: embeddings.len(),
        });
    }

    for (record, embedding) in records.iter().zip(embeddings) {
        conn.execute(
            "DELETE FROM vec_records WHERE rowid IN (SELECT id FROM records WHERE record_id = ?)",
            params![record.record_id],
        )?;
        conn.execute(
            "DELETE FROM records WHERE record_id = ?",
            params![record.record_id],
        )?;

        conn.execute(
            "INSERT INTO records (record_id, path, mtime, chunk_index, content_digest, content) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.record_id,
                record.path,
                record.mtime,
                record.chunk_index as i64,
                record.content_digest,
                record.content,
            ],
        )?;
        let rowid = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO vec_records (rowid, embedding) VALUES (?, ?)",
            params![rowid, serialize_vector(embedding)],
        )?;
    }

    Ok(())
}

fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        record_id: row.get(0)?,
        path: row.get(1)?,
        mtime: row.get(2)?,
        chunk_index: row.get::<_, i64>(3)? as usize,
        content_digest: row.get(4)?,
        content: row.get(5)?,
    })
}

impl Db {
    /// Insert records with their embeddings in one transaction.
    pub fn insert_records(
        &mut self,
        records: &[NewRecord<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        insert_in(&tx, records, embeddings)?;
        tx.commit()?;
        Ok(())
    }

    /// Atomically replace everything stored for `path` with `records`.
    ///
    /// Returns the number of records removed. Readers see either the old set
    /// or the new one, never an empty gap in between.
    pub fn replace_path(
        &mut self,
        path: &str,
        records: &[NewRecord<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let removed = delete_path_in(&tx, path)?;
        insert_in(&tx, records, embeddings)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Delete all records for `path`. Unknown paths delete nothing.
    pub fn delete_path(&mut self, path: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let removed = delete_path_in(&tx, path)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// All records matching `filter`, ordered by path then chunk index.
    pub fn get_records(&self, filter: RecordFilter<'_>) -> Result<Vec<StoredRecord>> {
        const COLUMNS: &str =
            "SELECT record_id, path, mtime, chunk_index, content_digest, content FROM records";

        let records = match filter.path {
            Some(path) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{COLUMNS} WHERE path = ? ORDER BY path, chunk_index"
                ))?;
                stmt.query_map(params![path], map_record_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{COLUMNS} ORDER BY path, chunk_index"))?;
                stmt.query_map([], map_record_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        Ok(records)
    }

    /// One summary per indexed path, ordered by path.
    pub fn path_summaries(&self) -> Result<Vec<PathSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT path, MAX(mtime), COUNT(*), MIN(content_digest)
            FROM records
            GROUP BY path
            ORDER BY path
            "#,
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(PathSummary {
                    path: row.get(0)?,
                    mtime: row.get(1)?,
                    chunks: row.get::<_, i64>(2)? as usize,
                    content_digest: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Delete every record. Returns how many were removed.
    pub fn reset(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM vec_records WHERE rowid IN (SELECT id FROM records)",
            [],
        )?;
        let removed = tx.execute("DELETE FROM records", [])?;
        tx.commit()?;
        Ok(removed)
    }
}
