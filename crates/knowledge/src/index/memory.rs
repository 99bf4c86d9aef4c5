//! In-memory brute-force index.

use super::{batch_dimension, check_query_dimension, cosine_similarity, VectorIndex};
use crate::types::{Hit, IndexEntry, Record, ScoreKind};
use ragkit_core::AppResult;
use std::collections::BTreeMap;

/// Scans every entry and ranks by cosine similarity, highest first.
///
/// Ties keep id order.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: BTreeMap<u64, IndexEntry>,
    dimension: Option<usize>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for MemoryIndex {
    fn add(&mut self, entries: &[IndexEntry]) -> AppResult<()> {
        self.dimension = batch_dimension(entries, self.dimension)?;
        for entry in entries {
            self.entries.insert(entry.record.id, entry.clone());
        }

        tracing::debug!(
            "Memory index now holds {} entries",
            self.entries.len()
        );
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<Hit>> {
        check_query_dimension(vector, self.dimension)?;

        let mut scored: Vec<(&IndexEntry, f32)> = self
            .entries
            .values()
            .map(|entry| (entry, cosine_similarity(vector, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(entry, score)| Hit {
                text: entry.record.text.clone(),
                source_tag: entry.record.source_tag.clone(),
                score,
            })
            .collect())
    }

    fn count(&self) -> AppResult<usize> {
        Ok(self.entries.len())
    }

    fn dimension(&self) -> AppResult<Option<usize>> {
        Ok(self.dimension)
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Similarity
    }

    fn reset(&mut self) -> AppResult<()> {
        self.entries.clear();
        self.dimension = None;
        Ok(())
    }

    fn get(&self, id: u64) -> AppResult<Option<Record>> {
        Ok(self.entries.get(&id).map(|e| e.record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, text: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            record: Record {
                id,
                text: text.to_string(),
                source_tag: "json".to_string(),
            },
            vector,
        }
    }

    fn populated() -> MemoryIndex {
        let mut index = MemoryIndex::new();
        index
            .add(&[
                entry(0, "rust", vec![1.0, 0.1, 0.0]),
                entry(1, "pasta", vec![0.0, 1.0, 0.0]),
                entry(2, "cargo", vec![0.9, 0.0, 0.1]),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_query_ranks_by_similarity() {
        let index = populated();
        let hits = index.query(&[1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.text != "pasta"));
    }

    #[test]
    fn test_add_is_idempotent_by_id() {
        let mut index = populated();
        index.add(&[entry(1, "pizza", vec![0.0, 1.0, 0.0])]).unwrap();

        assert_eq!(index.count().unwrap(), 3);
        assert_eq!(index.get(1).unwrap().unwrap().text, "pizza");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = populated();
        assert!(index.add(&[entry(7, "bad", vec![1.0, 0.0])]).is_err());
        assert!(index.query(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_query_batch_matches_single_queries() {
        let index = populated();
        let batch = index
            .query_batch(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]], 1)
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1][0].text, "pasta");
        assert_eq!(batch[0], index.query(&[1.0, 0.0, 0.0], 1).unwrap());
    }

    #[test]
    fn test_reset_clears_dimension() {
        let mut index = populated();
        index.reset().unwrap();

        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.dimension().unwrap(), None);
        index.add(&[entry(0, "short", vec![1.0, 0.0])]).unwrap();
        assert_eq!(index.dimension().unwrap(), Some(2));
    }
}
