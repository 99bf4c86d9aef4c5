//! SQLite-backed vector index.
//!
//! Records live in named collections inside one database file, so several agents
//! can share a file. Embeddings are stored as little-endian `f32` blobs and
//! searched by brute-force cosine distance. Nothing guards against two processes
//! writing the same collection.

use super::{batch_dimension, check_query_dimension, cosine_distance, VectorIndex};
use crate::types::{Hit, IndexEntry, Record, ScoreKind};
use chrono::{DateTime, Utc};
use ragkit_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// A persisted collection of records and embeddings.
pub struct SqliteIndex {
    conn: Connection,
    collection: String,
}

impl SqliteIndex {
    /// Open (creating if needed) a collection in the database at `db_path`.
    pub fn open(db_path: &Path, collection: impl Into<String>) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

        let index = Self::with_connection(conn, collection)?;
        tracing::debug!(
            "Opened SQLite index at {:?} (collection '{}')",
            db_path,
            index.collection
        );
        Ok(index)
    }

    /// Open a collection in a private in-memory database.
    pub fn open_in_memory(collection: impl Into<String>) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;
        Self::with_connection(conn, collection)
    }

    fn with_connection(conn: Connection, collection: impl Into<String>) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                built_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id INTEGER NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn,
            collection: collection.into(),
        })
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// When the collection was first populated.
    pub fn built_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        let built_at: Option<String> = self
            .conn
            .query_row(
                "SELECT built_at FROM collections WHERE name = ?1",
                params![self.collection],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Knowledge(format!("Failed to read collection: {}", e)))?;

        built_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        AppError::Knowledge(format!("Invalid built_at timestamp '{}': {}", s, e))
                    })
            })
            .transpose()
    }

    fn load_entries(&self) -> AppResult<Vec<IndexEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, text, source, embedding FROM records WHERE collection = ?1 ORDER BY id",
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![self.collection], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(|e| AppError::Knowledge(format!("Failed to query records: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, text, source_tag, blob) =
                row.map_err(|e| AppError::Knowledge(format!("Failed to read record: {}", e)))?;
            entries.push(IndexEntry {
                record: Record {
                    id: id as u64,
                    text,
                    source_tag,
                },
                vector: bytes_to_embedding(&blob)?,
            });
        }

        Ok(entries)
    }
}

impl VectorIndex for SqliteIndex {
    fn add(&mut self, entries: &[IndexEntry]) -> AppResult<()> {
        let current = self.dimension()?;
        let Some(dimension) = batch_dimension(entries, current)? else {
            return Ok(());
        };

        let tx = self
            .conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;

        if current.is_none() {
            tx.execute(
                "INSERT OR REPLACE INTO collections (name, dimension, built_at) VALUES (?1, ?2, ?3)",
                params![self.collection, dimension as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to register collection: {}", e)))?;
        }

        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO records (collection, id, text, source, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    self.collection,
                    entry.record.id as i64,
                    entry.record.text,
                    entry.record.source_tag,
                    embedding_to_bytes(&entry.vector),
                ],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to insert record: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit records: {}", e)))?;

        tracing::debug!(
            "Stored {} records in collection '{}'",
            entries.len(),
            self.collection
        );
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<Hit>> {
        check_query_dimension(vector, self.dimension()?)?;

        let mut scored: Vec<(Record, f32)> = self
            .load_entries()?
            .into_iter()
            .map(|entry| {
                let distance = cosine_distance(vector, &entry.vector);
                (entry.record, distance)
            })
            .collect();

        // Sort by distance ascending
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        tracing::debug!(
            "Retrieved {} records from '{}' (requested top-{})",
            scored.len(),
            self.collection,
            top_k
        );

        Ok(scored
            .into_iter()
            .map(|(record, score)| Hit {
                text: record.text,
                source_tag: record.source_tag,
                score,
            })
            .collect())
    }

    fn query_batch(&self, vectors: &[Vec<f32>], top_k: usize) -> AppResult<Vec<Vec<Hit>>> {
        let dimension = self.dimension()?;
        for vector in vectors {
            check_query_dimension(vector, dimension)?;
        }

        // One table scan for the whole batch
        let entries = self.load_entries()?;
        Ok(vectors
            .iter()
            .map(|vector| {
                let mut scored: Vec<(&IndexEntry, f32)> = entries
                    .iter()
                    .map(|e| (e, cosine_distance(vector, &e.vector)))
                    .collect();
                scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(top_k);
                scored
                    .into_iter()
                    .map(|(e, score)| Hit {
                        text: e.record.text.clone(),
                        source_tag: e.record.source_tag.clone(),
                        score,
                    })
                    .collect()
            })
            .collect())
    }

    fn count(&self) -> AppResult<usize> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?1",
                params![self.collection],
                |row| row.get::<_, i64>(0).map(|v| v as usize),
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to count records: {}", e)))
    }

    fn dimension(&self) -> AppResult<Option<usize>> {
        self.conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![self.collection],
                |row| row.get::<_, i64>(0).map(|v| v as usize),
            )
            .optional()
            .map_err(|e| AppError::Knowledge(format!("Failed to read collection: {}", e)))
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Distance
    }

    fn reset(&mut self) -> AppResult<()> {
        self.conn
            .execute(
                "DELETE FROM records WHERE collection = ?1",
                params![self.collection],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to delete records: {}", e)))?;

        self.conn
            .execute(
                "DELETE FROM collections WHERE name = ?1",
                params![self.collection],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to delete collection: {}", e)))?;

        tracing::info!("Reset collection '{}'", self.collection);
        Ok(())
    }

    fn get(&self, id: u64) -> AppResult<Option<Record>> {
        self.conn
            .query_row(
                "SELECT text, source FROM records WHERE collection = ?1 AND id = ?2",
                params![self.collection, id as i64],
                |row| {
                    Ok(Record {
                        id,
                        text: row.get(0)?,
                        source_tag: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| AppError::Knowledge(format!("Failed to read record {}: {}", id, e)))
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: u64, text: &str, source: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            record: Record {
                id,
                text: text.to_string(),
                source_tag: source.to_string(),
            },
            vector,
        }
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("index/agents.db");

        {
            let mut index = SqliteIndex::open(&db_path, "meddialog").unwrap();
            index
                .add(&[
                    entry(0, "Q: Q1\nA: A1", "json", vec![1.0, 0.0]),
                    entry(1, "Guide (Source: https://example.org)", "https://example.org", vec![0.0, 1.0]),
                ])
                .unwrap();
        }

        let index = SqliteIndex::open(&db_path, "meddialog").unwrap();
        assert_eq!(index.count().unwrap(), 2);
        assert_eq!(index.dimension().unwrap(), Some(2));
        assert!(index.built_at().unwrap().is_some());
        assert_eq!(index.get(0).unwrap().unwrap().text, "Q: Q1\nA: A1");
        assert_eq!(index.get(5).unwrap(), None);
    }

    #[test]
    fn test_query_reports_distance_ascending() {
        let mut index = SqliteIndex::open_in_memory("c").unwrap();
        index
            .add(&[
                entry(0, "far", "json", vec![0.0, 1.0]),
                entry(1, "near", "json", vec![1.0, 0.1]),
            ])
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(index.score_kind(), ScoreKind::Distance);
        assert_eq!(hits[0].text, "near");
        assert!(hits[0].score < hits[1].score);
        assert!((hits[1].score - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_collections_are_isolated() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("shared.db");

        let mut a = SqliteIndex::open(&db_path, "a").unwrap();
        a.add(&[entry(0, "alpha", "json", vec![1.0, 0.0])]).unwrap();

        let mut b = SqliteIndex::open(&db_path, "b").unwrap();
        assert_eq!(b.count().unwrap(), 0);
        b.add(&[entry(0, "beta", "json", vec![0.0, 1.0, 0.0])]).unwrap();

        assert_eq!(a.get(0).unwrap().unwrap().text, "alpha");
        assert_eq!(b.dimension().unwrap(), Some(3));

        b.reset().unwrap();
        assert_eq!(b.count().unwrap(), 0);
        assert_eq!(a.count().unwrap(), 1);
    }

    #[test]
    fn test_readd_replaces_and_validates_dimension() {
        let mut index = SqliteIndex::open_in_memory("c").unwrap();
        index.add(&[entry(0, "old", "json", vec![1.0, 0.0])]).unwrap();
        index.add(&[entry(0, "new", "json", vec![1.0, 0.0])]).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get(0).unwrap().unwrap().text, "new");
        assert!(index.add(&[entry(1, "bad", "json", vec![1.0])]).is_err());
    }

    #[test]
    fn test_query_batch() {
        let mut index = SqliteIndex::open_in_memory("c").unwrap();
        index
            .add(&[
                entry(0, "x", "json", vec![1.0, 0.0]),
                entry(1, "y", "json", vec![0.0, 1.0]),
            ])
            .unwrap();

        let batch = index
            .query_batch(&[vec![0.0, 1.0], vec![1.0, 0.0]], 1)
            .unwrap();
        assert_eq!(batch[0][0].text, "y");
        assert_eq!(batch[1][0].text, "x");
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let vector = vec![0.25, -1.5, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&vector)).unwrap(), vector);
        assert!(bytes_to_embedding(&[0, 1, 2]).is_err());
    }
}
