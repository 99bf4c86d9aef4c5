//! Command handlers for the ragkit CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod agent;
pub mod demo;
pub mod eval;

// Re-export command types for convenience
pub use agent::AgentCommand;
pub use demo::DemoCommand;
pub use eval::EvalCommand;

use ragkit_core::{config::AppConfig, AppError, AppResult};
use ragkit_knowledge::{create_provider, EmbeddingProvider};
use ragkit_llm::{create_client, LlmClient};
use serde::Serialize;
use std::sync::Arc;

/// Embedding provider from the workspace settings.
pub(crate) fn embedder(config: &AppConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let api_key = config.resolve_api_key();
    create_provider(&config.embedding, api_key.as_deref())
}

/// Generation client from the workspace settings.
pub(crate) fn generation_client(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    let api_key = config.resolve_api_key();
    create_client(&config.provider, config.endpoint.as_deref(), api_key.as_deref())
        .map_err(AppError::Llm)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(format!("JSON serialization failed: {}", e)))?;
    println!("{}", output);
    Ok(())
}
