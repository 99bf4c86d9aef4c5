//! Vector index abstraction.
//!
//! Two backends: an in-memory brute-force index reporting cosine similarity and
//! a SQLite-persisted collection reporting cosine distance.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use crate::types::{Hit, IndexEntry, Record, ScoreKind};
use ragkit_core::{AppError, AppResult};

/// Trait for vector index backends.
///
/// Implementations must support:
/// - Idempotent bulk insert keyed by record id
/// - Top-k search, single and batched
/// - Counting, resetting and reading back records
pub trait VectorIndex: Send {
    /// Insert entries, replacing any existing entry with the same id.
    ///
    /// Every vector must match the index dimension (fixed by the first insert).
    fn add(&mut self, entries: &[IndexEntry]) -> AppResult<()>;

    /// Top-k hits for a query vector, best first.
    fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<Hit>>;

    /// Top-k hits for several query vectors in one call.
    fn query_batch(&self, vectors: &[Vec<f32>], top_k: usize) -> AppResult<Vec<Vec<Hit>>> {
        vectors.iter().map(|v| self.query(v, top_k)).collect()
    }

    /// Number of stored entries.
    fn count(&self) -> AppResult<usize>;

    /// Vector dimension, `None` while empty.
    fn dimension(&self) -> AppResult<Option<usize>>;

    /// Whether scores are similarities or distances.
    fn score_kind(&self) -> ScoreKind;

    /// Remove all entries.
    fn reset(&mut self) -> AppResult<()>;

    /// Read back a stored record.
    fn get(&self, id: u64) -> AppResult<Option<Record>>;
}

/// Calculate cosine similarity between two vectors.
///
/// Mismatched lengths and zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance, `1 - similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Common dimension of a batch, checked against the index's current dimension.
pub(crate) fn batch_dimension(
    entries: &[IndexEntry],
    current: Option<usize>,
) -> AppResult<Option<usize>> {
    let Some(first) = entries.first() else {
        return Ok(current);
    };

    let expected = current.unwrap_or(first.vector.len());
    if expected == 0 {
        return Err(AppError::Knowledge(
            "Cannot index zero-length vectors".to_string(),
        ));
    }

    if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
        return Err(AppError::Knowledge(format!(
            "Dimension mismatch for record {}: expected {}, got {}",
            bad.record.id,
            expected,
            bad.vector.len()
        )));
    }

    Ok(Some(expected))
}

/// Check a query vector against the index dimension.
pub(crate) fn check_query_dimension(vector: &[f32], dimension: Option<usize>) -> AppResult<()> {
    match dimension {
        Some(dim) if dim != vector.len() => Err(AppError::Knowledge(format!(
            "Query dimension mismatch: index has {}, query has {}",
            dim,
            vector.len()
        ))),
        _ => Ok(()),
    }
}
