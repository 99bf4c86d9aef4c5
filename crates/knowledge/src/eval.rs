//! Evaluation of retrieval-augmented systems.
//!
//! For each query the evaluator scores retrieval (recall@k against a gold
//! answer, or an LLM relevance verdict) and asks an LLM judge for the fraction
//! of answer statements not supported by the retrieved context.

use crate::agent::RagTarget;
use crate::embeddings::EmbeddingProvider;
use crate::index::cosine_similarity;
use ragkit_core::{AppError, AppResult};
use ragkit_llm::{LlmClient, LlmRequest};
use ragkit_prompt::loader::{JUDGE_HALLUCINATION, JUDGE_RELEVANCE};
use ragkit_prompt::{build_prompt, builtin_prompt, PromptDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Retrieval metric key when a gold answer is available.
pub const RECALL_KEY: &str = "recall@k";

/// Retrieval metric key when the LLM judge decides.
pub const RELEVANCE_KEY: &str = "relevance";

/// Similarity a retrieved text must exceed to count as recalling the gold answer.
pub const DEFAULT_RECALL_THRESHOLD: f32 = 0.7;

const DEFAULT_SCORE: f64 = 1.0;
const DEFAULT_SOURCE: &str = "unknown";

/// A retrieved hit in any shape a target may report.
///
/// Deserializes from `["text", "source", 0.4]`, `["text", "source"]` or `"text"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawHit {
    Scored(String, String, f64),
    Sourced(String, String),
    Bare(String),
}

/// A hit with every field present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHit {
    pub text: String,
    pub source: String,
    pub score: f64,
}

/// Fill in `score = 1.0` and `source = "unknown"` where a hit lacks them.
pub fn normalize_hits(hits: Vec<RawHit>) -> Vec<NormalizedHit> {
    hits.into_iter()
        .map(|hit| match hit {
            RawHit::Scored(text, source, score) => NormalizedHit {
                text,
                source,
                score,
            },
            RawHit::Sourced(text, source) => NormalizedHit {
                text,
                source,
                score: DEFAULT_SCORE,
            },
            RawHit::Bare(text) => NormalizedHit {
                text,
                source: DEFAULT_SOURCE.to_string(),
                score: DEFAULT_SCORE,
            },
        })
        .collect()
}

/// What to do when a judge's reply does not parse as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeFailurePolicy {
    /// Fail the evaluation with `AppError::Evaluation`
    Propagate,
    /// Leave the metric out of the result
    Absent,
}

/// Evaluator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    pub relevance_failure: JudgeFailurePolicy,
    pub hallucination_failure: JudgeFailurePolicy,
    pub recall_threshold: f32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            relevance_failure: JudgeFailurePolicy::Propagate,
            hallucination_failure: JudgeFailurePolicy::Absent,
            recall_threshold: DEFAULT_RECALL_THRESHOLD,
        }
    }
}

/// Scores for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub query: String,

    /// Either `recall@k` or `relevance`; empty when the relevance verdict was unusable
    pub retrieval: BTreeMap<String, f64>,

    /// Fraction of hallucinated statements, `None` when the verdict was unusable
    pub hallucination_rate: Option<f64>,

    pub answer: String,
}

/// Means over a set of results, skipping absent metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub queries: usize,
    pub retrieval: BTreeMap<String, f64>,
    pub hallucination_rate: Option<f64>,
}

impl EvaluationSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for result in results {
            for (key, value) in &result.retrieval {
                let slot = sums.entry(key.clone()).or_insert((0.0, 0));
                slot.0 += value;
                slot.1 += 1;
            }
        }

        let rates: Vec<f64> = results.iter().filter_map(|r| r.hallucination_rate).collect();

        Self {
            queries: results.len(),
            retrieval: sums
                .into_iter()
                .map(|(key, (sum, n))| (key, sum / n as f64))
                .collect(),
            hallucination_rate: if rates.is_empty() {
                None
            } else {
                Some(rates.iter().sum::<f64>() / rates.len() as f64)
            },
        }
    }
}

/// Drives a [`RagTarget`] over a query set and scores it.
pub struct Evaluator {
    judge: Arc<dyn LlmClient>,
    judge_model: String,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EvaluatorConfig,
    relevance_prompt: Option<PromptDefinition>,
    hallucination_prompt: Option<PromptDefinition>,
}

impl Evaluator {
    pub fn new(
        judge: Arc<dyn LlmClient>,
        judge_model: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            judge,
            judge_model: judge_model.into(),
            embedder,
            config,
            relevance_prompt: None,
            hallucination_prompt: None,
        }
    }

    /// Replace the built-in judge prompts.
    pub fn with_prompts(mut self, relevance: PromptDefinition, hallucination: PromptDefinition) -> Self {
        self.relevance_prompt = Some(relevance);
        self.hallucination_prompt = Some(hallucination);
        self
    }

    /// Evaluate queries one after another, preserving order.
    ///
    /// A non-blank gold answer keyed by the exact query text switches that
    /// query's retrieval metric from the relevance judge to recall@k.
    pub async fn evaluate(
        &self,
        target: &dyn RagTarget,
        queries: &[String],
        gold_answers: Option<&HashMap<String, String>>,
    ) -> AppResult<Vec<EvaluationResult>> {
        let mut results = Vec::with_capacity(queries.len());

        for (i, query) in queries.iter().enumerate() {
            tracing::info!("Evaluating query {}/{}", i + 1, queries.len());

            let hits = normalize_hits(target.retrieve_hits(query).await?);
            let texts: Vec<String> = hits.into_iter().map(|h| h.text).collect();
            let answer = target.answer(query).await?;

            let mut retrieval = BTreeMap::new();
            let gold = gold_answers
                .and_then(|gold| gold.get(query))
                .filter(|gold| !gold.trim().is_empty());
            match gold {
                Some(gold) => {
                    let recall = self.recall_at_k(gold, &texts).await?;
                    retrieval.insert(RECALL_KEY.to_string(), recall);
                }
                None => {
                    if let Some(relevance) = self.judge_relevance(query, &texts).await? {
                        retrieval.insert(RELEVANCE_KEY.to_string(), relevance);
                    }
                }
            }

            let hallucination_rate = self.judge_hallucination(&texts, &answer).await?;

            results.push(EvaluationResult {
                query: query.clone(),
                retrieval,
                hallucination_rate,
                answer,
            });
        }

        Ok(results)
    }

    /// 1.0 when any retrieved text is closer than the threshold to the gold answer.
    async fn recall_at_k(&self, gold: &str, texts: &[String]) -> AppResult<f64> {
        if texts.is_empty() {
            return Ok(0.0);
        }

        let mut batch = Vec::with_capacity(texts.len() + 1);
        batch.push(gold.to_string());
        batch.extend(texts.iter().cloned());

        let vectors = self.embedder.embed_batch(&batch).await?;
        let Some((gold_vector, retrieved)) = vectors.split_first() else {
            return Err(AppError::Evaluation(
                "Embedding provider returned no vectors".to_string(),
            ));
        };

        let hit = retrieved
            .iter()
            .any(|v| cosine_similarity(gold_vector, v) > self.config.recall_threshold);
        Ok(if hit { 1.0 } else { 0.0 })
    }

    async fn judge_relevance(&self, query: &str, texts: &[String]) -> AppResult<Option<f64>> {
        let mut variables = HashMap::new();
        variables.insert("query".to_string(), query.to_string());
        variables.insert("context".to_string(), texts.join("\n"));

        let reply = self
            .ask_judge(&self.relevance_prompt, JUDGE_RELEVANCE, variables)
            .await?;

        match reply.trim().parse::<i64>() {
            Ok(verdict) => Ok(Some(verdict as f64)),
            Err(_) => self.on_parse_failure(self.config.relevance_failure, "relevance", &reply),
        }
    }

    async fn judge_hallucination(&self, texts: &[String], answer: &str) -> AppResult<Option<f64>> {
        let mut variables = HashMap::new();
        variables.insert("context".to_string(), texts.join("\n"));
        variables.insert("answer".to_string(), answer.to_string());

        let reply = self
            .ask_judge(&self.hallucination_prompt, JUDGE_HALLUCINATION, variables)
            .await?;

        match reply.trim().parse::<f64>() {
            Ok(rate) => Ok(Some(rate)),
            Err(_) => self.on_parse_failure(
                self.config.hallucination_failure,
                "hallucination",
                &reply,
            ),
        }
    }

    async fn ask_judge(
        &self,
        custom: &Option<PromptDefinition>,
        prompt_id: &str,
        variables: HashMap<String, String>,
    ) -> AppResult<String> {
        let definition = match custom {
            Some(prompt) => prompt.clone(),
            None => builtin_prompt(prompt_id)?,
        };
        let built = build_prompt(&definition, variables)?;

        let request = LlmRequest::new(built.user, &self.judge_model)
            .with_temperature(built.behavior.temperature)
            .with_max_tokens(built.behavior.max_tokens);

        Ok(self.judge.complete(&request).await?.content)
    }

    fn on_parse_failure(
        &self,
        policy: JudgeFailurePolicy,
        metric: &str,
        reply: &str,
    ) -> AppResult<Option<f64>> {
        match policy {
            JudgeFailurePolicy::Propagate => Err(AppError::Evaluation(format!(
                "Unparseable {} verdict from judge: {:?}",
                metric, reply
            ))),
            JudgeFailurePolicy::Absent => {
                tracing::warn!("Ignoring unparseable {} verdict: {:?}", metric, reply);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_hit_shapes_deserialize() {
        let hits: Vec<RawHit> =
            serde_json::from_str(r#"[["a", "s1", 0.4], ["b", "s2"], "c", ["d", "s4", 2]]"#)
                .unwrap();

        assert_eq!(
            hits,
            vec![
                RawHit::Scored("a".into(), "s1".into(), 0.4),
                RawHit::Sourced("b".into(), "s2".into()),
                RawHit::Bare("c".into()),
                RawHit::Scored("d".into(), "s4".into(), 2.0),
            ]
        );
    }

    #[test]
    fn test_normalize_applies_defaults_only_where_absent() {
        let normalized = normalize_hits(vec![
            RawHit::Scored("a".into(), "s1".into(), 0.4),
            RawHit::Sourced("b".into(), "s2".into()),
            RawHit::Bare("c".into()),
        ]);

        assert_eq!(normalized[0].score, 0.4);
        assert_eq!(normalized[0].source, "s1");
        assert_eq!(normalized[1].score, 1.0);
        assert_eq!(normalized[1].source, "s2");
        assert_eq!(normalized[2].score, 1.0);
        assert_eq!(normalized[2].source, "unknown");
    }

    #[test]
    fn test_summary_skips_absent_metrics() {
        let results = vec![
            EvaluationResult {
                query: "q1".into(),
                retrieval: BTreeMap::from([(RELEVANCE_KEY.to_string(), 1.0)]),
                hallucination_rate: Some(0.5),
                answer: "a".into(),
            },
            EvaluationResult {
                query: "q2".into(),
                retrieval: BTreeMap::from([(RELEVANCE_KEY.to_string(), 0.0)]),
                hallucination_rate: None,
                answer: "b".into(),
            },
        ];

        let summary = EvaluationSummary::from_results(&results);
        assert_eq!(summary.queries, 2);
        assert_eq!(summary.retrieval[RELEVANCE_KEY], 0.5);
        assert_eq!(summary.hallucination_rate, Some(0.5));
    }

    #[test]
    fn test_result_serializes_absent_rate_as_null() {
        let result = EvaluationResult {
            query: "q".into(),
            retrieval: BTreeMap::new(),
            hallucination_rate: None,
            answer: "a".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["hallucination_rate"].is_null());
    }
}
