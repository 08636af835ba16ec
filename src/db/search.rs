use super::{Db, Result, models::*, serialize_vector};
use rusqlite::params;

impl Db {
    /// Nearest records to `query_vector` by cosine distance, closest first.
    pub fn query(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<QueryRow>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                r.record_id,
                r.path,
                r.mtime,
                r.chunk_index,
                r.content_digest,
                r.content,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_records v
            JOIN records r ON v.rowid = r.id
            ORDER BY distance ASC, r.id ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            |row| {
                Ok(QueryRow {
                    record: StoredRecord {
                        record_id: row.get(0)?,
                        path: row.get(1)?,
                        mtime: row.get(2)?,
                        chunk_index: row.get::<_, i64>(3)? as usize,
                        content_digest: row.get(4)?,
                        content: row.get(5)?,
                    },
                    distance: row.get(6)?,
                })
            },
        )?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dims];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_query_orders_by_distance() {
        let mut db = Db::open_in_memory(4).unwrap();
        let records = [
            NewRecord {
                record_id: "a:0",
                path: "/a.md",
                mtime: 1.0,
                chunk_index: 0,
                content_digest: "a",
                content: "alpha",
            },
            NewRecord {
                record_id: "b:0",
                path: "/b.md",
                mtime: 2.0,
                chunk_index: 0,
                content_digest: "b",
                content: "beta",
            },
        ];
        let near_b = vec![0.1, 0.9, 0.0, 0.0];
        db.insert_records(&records, &[unit(4, 0), unit(4, 1)]).unwrap();

        let hits = db.query(&near_b, 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.path, "/b.md");
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits.iter().all(|h| (0.0..=2.0).contains(&h.distance)));

        let exact = db.query(&unit(4, 0), 1).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].record.content, "alpha");
        assert!(exact[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_query_empty_store() {
        let db = Db::open_in_memory(4).unwrap();
        assert!(db.query(&unit(4, 2), 3).unwrap().is_empty());
        assert!(db.query(&unit(4, 2), 0).unwrap().is_empty());
    }
}
