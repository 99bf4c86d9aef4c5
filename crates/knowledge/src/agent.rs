//! Retrieval agent.
//!
//! One agent type covers every knowledge source: the document source and the
//! vector index are chosen at construction, generation is optional.

use crate::embeddings::EmbeddingProvider;
use crate::eval::RawHit;
use crate::index::VectorIndex;
use crate::sources::DocumentSource;
use crate::types::{Hit, IndexEntry, Record, ScoreKind};
use async_trait::async_trait;
use ragkit_core::{AppError, AppResult};
use ragkit_llm::{LlmClient, LlmRequest};
use ragkit_prompt::{build_prompt, builtin_prompt, loader::RAG_ANSWER, PromptDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Returned verbatim when retrieval finds nothing.
pub const NO_RESULTS_MESSAGE: &str = "No relevant entries found.";

/// Sources line used when no hit carries a URL.
pub const NO_SOURCES_MESSAGE: &str = "No external URLs retrieved.";

/// Disclaimer the answer prompt asks the model to include.
pub const DEFAULT_DISCLAIMER: &str =
    "This information is for educational purposes only and not a substitute for professional medical advice.";

/// Role the answer prompt assigns to the model.
pub const DEFAULT_PERSONA: &str = "a helpful medical assistant";

/// Default number of hits per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Subject phrase for Q&A knowledge bases.
pub const SUBJECT_QA: &str = "Q&A";

/// Subject phrase for labeled URL lists.
pub const SUBJECT_DOCS: &str = "the retrieved docs";

/// Subject phrase for scraped pages.
pub const SUBJECT_WEB: &str = "the retrieved web content";

/// What `ensure_populated` does to an index that already has entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Keep existing entries
    #[default]
    Never,
    /// Reset, then populate from the source again
    Rebuild,
}

/// Result of `ensure_populated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    /// The index was filled with this many records
    Populated(usize),
    /// The index already held this many records; nothing was done
    AlreadyPopulated(usize),
}

impl PopulateOutcome {
    pub fn count(&self) -> usize {
        match self {
            PopulateOutcome::Populated(n) | PopulateOutcome::AlreadyPopulated(n) => *n,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Maximum hits per query
    pub top_k: usize,

    /// Drop hits failing this score (similarity `>=`, distance `<=`)
    pub min_score: Option<f32>,

    /// Cut hit text to this many characters in non-generated answers
    pub preview_chars: Option<usize>,

    pub refresh: RefreshPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: None,
            preview_chars: None,
            refresh: RefreshPolicy::Never,
        }
    }
}

/// Answer synthesis through a generation provider.
pub struct Generator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    subject: String,
    persona: String,
    disclaimer: String,
    prompt: Option<PromptDefinition>,
}

impl Generator {
    /// Generator using the built-in answer prompt (temperature 0.2, 250 tokens).
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.2,
            max_tokens: 250,
            subject: SUBJECT_QA.to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
            prompt: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.disclaimer = disclaimer.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Use a custom answer prompt, adopting its decoding parameters.
    pub fn with_prompt(mut self, prompt: PromptDefinition) -> Self {
        self.temperature = prompt.behavior.temperature;
        self.max_tokens = prompt.behavior.max_tokens;
        self.prompt = Some(prompt);
        self
    }

    async fn synthesize(&self, query: &str, hits: &[Hit]) -> AppResult<String> {
        let definition = match &self.prompt {
            Some(prompt) => prompt.clone(),
            None => builtin_prompt(RAG_ANSWER)?,
        };

        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let links: Vec<&str> = hits
            .iter()
            .filter(|h| h.is_url())
            .map(|h| h.source_tag.as_str())
            .collect();
        let sources = if links.is_empty() {
            NO_SOURCES_MESSAGE.to_string()
        } else {
            links.join("\n")
        };

        let mut variables = HashMap::new();
        variables.insert("persona".to_string(), self.persona.clone());
        variables.insert("subject".to_string(), self.subject.clone());
        variables.insert("disclaimer".to_string(), self.disclaimer.clone());
        variables.insert("query".to_string(), query.to_string());
        variables.insert("context".to_string(), context);
        variables.insert("sources".to_string(), sources);

        let built = build_prompt(&definition, variables)?;

        let request = LlmRequest::new(built.user, &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        tracing::debug!(
            "Synthesizing answer with {} (model: {}, {} hits)",
            self.client.provider_name(),
            self.model,
            hits.len()
        );

        let response = self.client.complete(&request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Builder for [`RetrievalAgent`].
pub struct RetrievalAgentBuilder {
    name: String,
    source: Box<dyn DocumentSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Box<dyn VectorIndex>,
    config: AgentConfig,
    generator: Option<Generator>,
}

impl RetrievalAgentBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn build(self) -> AppResult<RetrievalAgent> {
        if self.config.top_k == 0 {
            return Err(AppError::Config("top_k must be at least 1".to_string()));
        }

        let score_kind = self.index.score_kind();
        Ok(RetrievalAgent {
            name: self.name,
            source: self.source,
            embedder: self.embedder,
            index: Mutex::new(self.index),
            score_kind,
            config: self.config,
            generator: self.generator,
        })
    }
}

/// Retrieves top-k records for a query and optionally synthesizes an answer.
///
/// No results are cached: every call embeds the query again and, with
/// generation enabled, calls the generation provider again.
pub struct RetrievalAgent {
    name: String,
    source: Box<dyn DocumentSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Mutex<Box<dyn VectorIndex>>,
    score_kind: ScoreKind,
    config: AgentConfig,
    generator: Option<Generator>,
}

impl RetrievalAgent {
    pub fn builder(
        source: Box<dyn DocumentSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Box<dyn VectorIndex>,
    ) -> RetrievalAgentBuilder {
        RetrievalAgentBuilder {
            name: source.name().to_string(),
            source,
            embedder,
            index,
            config: AgentConfig::default(),
            generator: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn score_kind(&self) -> ScoreKind {
        self.score_kind
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Fill the index from the source when it is empty.
    ///
    /// Ids are assigned `0..n` in source order. With [`RefreshPolicy::Rebuild`]
    /// the index is reset first.
    pub async fn ensure_populated(&self) -> AppResult<PopulateOutcome> {
        let mut index = self.index.lock().await;

        if self.config.refresh == RefreshPolicy::Rebuild {
            tracing::info!("Rebuilding index for agent '{}'", self.name);
            index.reset()?;
        }

        let existing = index.count()?;
        if existing > 0 {
            tracing::debug!(
                "Agent '{}' index already holds {} records",
                self.name,
                existing
            );
            return Ok(PopulateOutcome::AlreadyPopulated(existing));
        }

        let drafts = self.source.produce_records().await?;
        if drafts.is_empty() {
            tracing::warn!("Source '{}' produced no records", self.source.name());
            return Ok(PopulateOutcome::Populated(0));
        }

        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != drafts.len() {
            return Err(AppError::Knowledge(format!(
                "Embedding provider returned {} vectors for {} records",
                vectors.len(),
                drafts.len()
            )));
        }

        let entries: Vec<IndexEntry> = drafts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(id, (draft, vector))| IndexEntry {
                record: Record {
                    id: id as u64,
                    text: draft.text,
                    source_tag: draft.source_tag,
                },
                vector,
            })
            .collect();

        index.add(&entries)?;

        tracing::info!(
            "Populated agent '{}' with {} records ({} / {})",
            self.name,
            entries.len(),
            self.embedder.provider_name(),
            self.embedder.model_name()
        );
        Ok(PopulateOutcome::Populated(entries.len()))
    }

    /// Top-k hits for a query in the index's native order.
    pub async fn retrieve(&self, query: &str) -> AppResult<Vec<Hit>> {
        let vector = self.embedder.embed(query).await?;
        let hits = {
            let index = self.index.lock().await;
            index.query(&vector, self.config.top_k)?
        };

        let hits = self.apply_threshold(hits);
        tracing::debug!("Retrieved {} hits for query: {}", hits.len(), query);
        Ok(hits)
    }

    /// Hits for several queries with one embedding call and one index call.
    pub async fn retrieve_batch(&self, queries: &[String]) -> AppResult<Vec<(String, Vec<Hit>)>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed_batch(queries).await?;
        let batches = {
            let index = self.index.lock().await;
            index.query_batch(&vectors, self.config.top_k)?
        };

        Ok(queries
            .iter()
            .cloned()
            .zip(batches)
            .map(|(query, hits)| (query, self.apply_threshold(hits)))
            .collect())
    }

    /// Answer a query from retrieved records.
    ///
    /// Without hits the fixed [`NO_RESULTS_MESSAGE`] is returned and the
    /// generation provider is not called.
    pub async fn answer(&self, query: &str) -> AppResult<String> {
        let hits = self.retrieve(query).await?;
        if hits.is_empty() {
            return Ok(NO_RESULTS_MESSAGE.to_string());
        }

        match &self.generator {
            Some(generator) => generator.synthesize(query, &hits).await,
            None => Ok(self.format_hits(&hits)),
        }
    }

    /// Number of indexed records.
    pub async fn count(&self) -> AppResult<usize> {
        self.index.lock().await.count()
    }

    /// Empty the index.
    pub async fn reset(&self) -> AppResult<()> {
        self.index.lock().await.reset()
    }

    /// Read back a stored record.
    pub async fn record(&self, id: u64) -> AppResult<Option<Record>> {
        self.index.lock().await.get(id)
    }

    fn apply_threshold(&self, hits: Vec<Hit>) -> Vec<Hit> {
        match self.config.min_score {
            Some(threshold) => hits
                .into_iter()
                .filter(|h| self.score_kind.passes(h.score, threshold))
                .collect(),
            None => hits,
        }
    }

    fn format_hits(&self, hits: &[Hit]) -> String {
        hits.iter()
            .map(|hit| {
                let text = match self.config.preview_chars {
                    Some(limit) => format!("{}...", hit.text.chars().take(limit).collect::<String>()),
                    None => hit.text.clone(),
                };
                format!(
                    "{}\n(source: {}, {}: {:.2})",
                    text,
                    hit.source_tag,
                    self.score_kind.label(),
                    hit.score
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

/// A retrieval-augmented system the evaluator can drive as a black box.
#[async_trait]
pub trait RagTarget: Send + Sync {
    /// Retrieved hits for a query, in any of the tolerated shapes.
    async fn retrieve_hits(&self, query: &str) -> AppResult<Vec<RawHit>>;

    /// Final answer text for a query.
    async fn answer(&self, query: &str) -> AppResult<String>;
}

#[async_trait]
impl RagTarget for RetrievalAgent {
    async fn retrieve_hits(&self, query: &str) -> AppResult<Vec<RawHit>> {
        Ok(self
            .retrieve(query)
            .await?
            .into_iter()
            .map(|hit| RawHit::Scored(hit.text, hit.source_tag, hit.score as f64))
            .collect())
    }

    async fn answer(&self, query: &str) -> AppResult<String> {
        RetrievalAgent::answer(self, query).await
    }
}
