//! Error types for ragkit.
//!
//! One error enum covers configuration, I/O, generation, knowledge base,
//! prompt and evaluation failures.

use thiserror::Error;

/// Unified error type for ragkit.
///
/// Library code returns `Result<T, AppError>` and never panics.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation provider errors (transport, API status, malformed payloads)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base, embedding and index errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Evaluation errors, such as an unparseable judge verdict
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
