//! Retrieval-augmented answering over small knowledge bases.
//!
//! Records come from a [`sources::DocumentSource`] (Q&A files, labeled URLs,
//! scraped pages), are embedded by an [`embeddings::EmbeddingProvider`] and
//! stored in a [`index::VectorIndex`]. A [`agent::RetrievalAgent`] answers
//! queries from the index, and an [`eval::Evaluator`] scores any
//! [`agent::RagTarget`].

pub mod agent;
pub mod documents;
pub mod embeddings;
pub mod eval;
pub mod index;
pub mod profile;
pub mod scrape;
pub mod sources;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use agent::{
    AgentConfig, Generator, PopulateOutcome, RagTarget, RefreshPolicy, RetrievalAgent,
    NO_RESULTS_MESSAGE,
};
pub use documents::AssemblyMode;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use eval::{
    normalize_hits, EvaluationResult, EvaluationSummary, Evaluator, EvaluatorConfig,
    JudgeFailurePolicy, NormalizedHit, RawHit,
};
pub use index::{MemoryIndex, SqliteIndex, VectorIndex};
pub use profile::{load_profile, AgentProfile};
pub use types::{Hit, IndexEntry, KbRow, Record, RecordDraft, ScoreKind, UrlEntry};
