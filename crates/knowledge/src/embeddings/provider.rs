//! Embedding provider trait and factory.

use super::providers::{OllamaProvider, OpenAiProvider, TrigramProvider};
use ragkit_core::config::{EmbeddingSettings, KNOWN_EMBEDDING_PROVIDERS};
use ragkit_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "openai", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from workspace settings.
pub fn create_provider(
    settings: &EmbeddingSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    if settings.dimensions == 0 {
        return Err(AppError::Config(
            "Embedding dimensions must be greater than zero".to_string(),
        ));
    }

    match settings.provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramProvider::new(settings.dimensions))),

        "ollama" => {
            let provider = match &settings.endpoint {
                Some(endpoint) => OllamaProvider::with_base_url(
                    endpoint,
                    &settings.model,
                    settings.dimensions,
                ),
                None => OllamaProvider::new(&settings.model, settings.dimensions),
            };
            Ok(Arc::new(provider))
        }

        "openai" => {
            let key = api_key.ok_or_else(|| {
                AppError::Config(
                    "OpenAI embeddings require an API key (set OPENAI_API_KEY or RAGKIT_API_KEY)"
                        .to_string(),
                )
            })?;
            let provider = match &settings.endpoint {
                Some(endpoint) => OpenAiProvider::with_base_url(
                    endpoint,
                    key,
                    &settings.model,
                    settings.dimensions,
                ),
                None => OpenAiProvider::new(key, &settings.model, settings.dimensions),
            };
            Ok(Arc::new(provider))
        }

        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: {}",
            other,
            KNOWN_EMBEDDING_PROVIDERS.join(", ")
        ))),
    }
}

/// Check that a provider returned one vector of the right size per input.
pub(crate) fn check_embeddings(
    provider: &str,
    expected_count: usize,
    dimensions: usize,
    embeddings: &[Vec<f32>],
) -> AppResult<()> {
    if embeddings.len() != expected_count {
        return Err(AppError::Knowledge(format!(
            "{} returned {} embeddings for {} texts",
            provider,
            embeddings.len(),
            expected_count
        )));
    }

    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
        return Err(AppError::Knowledge(format!(
            "{} returned {} dimensions, expected {}",
            provider,
            bad.len(),
            dimensions
        )));
    }

    Ok(())
}
