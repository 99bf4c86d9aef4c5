//! Embedding providers.
//!
//! One trait, three backends: an offline trigram hasher and two HTTP APIs.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{OllamaProvider, OpenAiProvider, TrigramProvider};
