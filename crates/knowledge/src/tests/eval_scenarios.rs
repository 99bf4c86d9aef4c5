use super::support::{medical_drafts, KeywordEmbedder, ScriptedClient, MEDICAL_KEYWORDS};
use crate::agent::{AgentConfig, RagTarget, RetrievalAgent};
use crate::eval::{
    EvaluationSummary, Evaluator, EvaluatorConfig, JudgeFailurePolicy, RawHit, RECALL_KEY,
    RELEVANCE_KEY,
};
use crate::index::MemoryIndex;
use crate::sources::StaticSource;
use async_trait::async_trait;
use ragkit_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Target returning the same hits and answer for every query.
struct StubTarget {
    hits: Vec<RawHit>,
    answer: String,
}

impl StubTarget {
    fn new(hits: Vec<RawHit>, answer: &str) -> Self {
        Self {
            hits,
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl RagTarget for StubTarget {
    async fn retrieve_hits(&self, _query: &str) -> AppResult<Vec<RawHit>> {
        Ok(self.hits.clone())
    }

    async fn answer(&self, _query: &str) -> AppResult<String> {
        Ok(self.answer.clone())
    }
}

fn evaluator(judge: Arc<ScriptedClient>, config: EvaluatorConfig) -> Evaluator {
    Evaluator::new(judge, "judge-model", KeywordEmbedder::new(&MEDICAL_KEYWORDS), config)
}

fn queries(items: &[&str]) -> Vec<String> {
    items.iter().map(|q| q.to_string()).collect()
}

#[tokio::test]
async fn test_recall_hit_with_gold_answer() {
    let judge = ScriptedClient::new(&["0.0"]);
    let target = StubTarget::new(
        vec![RawHit::Sourced("Spotting may occur.".to_string(), "json".to_string())],
        "Spotting may occur.",
    );
    let gold = HashMap::from([("q".to_string(), "Some spotting is expected".to_string())]);

    let results = evaluator(judge.clone(), EvaluatorConfig::default())
        .evaluate(&target, &queries(&["q"]), Some(&gold))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].retrieval.get(RECALL_KEY), Some(&1.0));
    assert!(!results[0].retrieval.contains_key(RELEVANCE_KEY));
    assert_eq!(results[0].hallucination_rate, Some(0.0));
    // Only the hallucination judge ran
    assert_eq!(judge.calls(), 1);
}

#[tokio::test]
async fn test_recall_miss_with_gold_answer() {
    let judge = ScriptedClient::new(&["1"]);
    let target = StubTarget::new(
        vec![RawHit::Bare("How do I cook pasta?".to_string())],
        "Boil water.",
    );
    let gold = HashMap::from([("q".to_string(), "Spotting is common".to_string())]);

    let results = evaluator(judge, EvaluatorConfig::default())
        .evaluate(&target, &queries(&["q"]), Some(&gold))
        .await
        .unwrap();

    assert_eq!(results[0].retrieval.get(RECALL_KEY), Some(&0.0));
    assert_eq!(results[0].hallucination_rate, Some(1.0));
}

#[tokio::test]
async fn test_recall_with_no_hits_is_zero() {
    let judge = ScriptedClient::new(&["0"]);
    let embedder = KeywordEmbedder::new(&MEDICAL_KEYWORDS);
    let evaluator = Evaluator::new(judge, "judge-model", embedder.clone(), EvaluatorConfig::default());
    let target = StubTarget::new(Vec::new(), "No relevant entries found.");
    let gold = HashMap::from([("q".to_string(), "Spotting".to_string())]);

    let results = evaluator
        .evaluate(&target, &queries(&["q"]), Some(&gold))
        .await
        .unwrap();

    assert_eq!(results[0].retrieval.get(RECALL_KEY), Some(&0.0));
    assert_eq!(embedder.batch_calls(), 0);
}

#[tokio::test]
async fn test_blank_gold_answer_uses_relevance_judge() {
    let judge = ScriptedClient::new(&["1", "0.0"]);
    let embedder = KeywordEmbedder::new(&MEDICAL_KEYWORDS);
    let evaluator = Evaluator::new(
        judge.clone(),
        "judge-model",
        embedder.clone(),
        EvaluatorConfig::default(),
    );
    let target = StubTarget::new(
        vec![RawHit::Bare("Spotting may occur.".to_string())],
        "Spotting may occur.",
    );
    let gold = HashMap::from([("q".to_string(), "  ".to_string())]);

    let results = evaluator
        .evaluate(&target, &queries(&["q"]), Some(&gold))
        .await
        .unwrap();

    assert_eq!(results[0].retrieval.get(RELEVANCE_KEY), Some(&1.0));
    assert!(!results[0].retrieval.contains_key(RECALL_KEY));
    assert_eq!(judge.calls(), 2);
    assert_eq!(embedder.batch_calls(), 0);
}

#[tokio::test]
async fn test_relevance_judge_without_gold() {
    let judge = ScriptedClient::new(&[" 1\n", "0.25"]);
    let target = StubTarget::new(
        vec![
            RawHit::Bare("first".to_string()),
            RawHit::Scored("second".to_string(), "json".to_string(), 0.4),
        ],
        "An answer.",
    );

    let results = evaluator(judge.clone(), EvaluatorConfig::default())
        .evaluate(&target, &queries(&["is the pill safe?"]), None)
        .await
        .unwrap();

    assert_eq!(results[0].retrieval.get(RELEVANCE_KEY), Some(&1.0));
    assert_eq!(results[0].hallucination_rate, Some(0.25));
    assert_eq!(results[0].answer, "An answer.");

    let requests = judge.requests();
    assert_eq!(requests.len(), 2);

    let relevance = &requests[0];
    assert_eq!(relevance.model, "judge-model");
    assert_eq!(relevance.temperature, Some(0.0));
    assert_eq!(relevance.max_tokens, Some(5));
    assert!(relevance.prompt.contains("is the pill safe?"));
    assert!(relevance.prompt.contains("first\nsecond"));

    let hallucination = &requests[1];
    assert_eq!(hallucination.temperature, Some(0.0));
    assert_eq!(hallucination.max_tokens, Some(10));
    assert!(hallucination.prompt.contains("An answer."));
}

#[tokio::test]
async fn test_unparseable_relevance_propagates_by_default() {
    let judge = ScriptedClient::new(&["Yes, relevant"]);
    let target = StubTarget::new(vec![RawHit::Bare("text".to_string())], "answer");

    let result = evaluator(judge, EvaluatorConfig::default())
        .evaluate(&target, &queries(&["q"]), None)
        .await;

    assert!(matches!(result, Err(AppError::Evaluation(_))));
}

#[tokio::test]
async fn test_unparseable_relevance_can_be_left_out() {
    let judge = ScriptedClient::new(&["Yes, relevant", "0"]);
    let target = StubTarget::new(vec![RawHit::Bare("text".to_string())], "answer");
    let config = EvaluatorConfig {
        relevance_failure: JudgeFailurePolicy::Absent,
        ..EvaluatorConfig::default()
    };

    let results = evaluator(judge, config)
        .evaluate(&target, &queries(&["q"]), None)
        .await
        .unwrap();

    assert!(results[0].retrieval.is_empty());
    assert_eq!(results[0].hallucination_rate, Some(0.0));
}

#[tokio::test]
async fn test_unparseable_hallucination_is_absent_by_default() {
    let judge = ScriptedClient::new(&["1", "about a third"]);
    let target = StubTarget::new(vec![RawHit::Bare("text".to_string())], "answer");

    let results = evaluator(judge, EvaluatorConfig::default())
        .evaluate(&target, &queries(&["q"]), None)
        .await
        .unwrap();

    assert_eq!(results[0].retrieval.get(RELEVANCE_KEY), Some(&1.0));
    assert_eq!(results[0].hallucination_rate, None);
}

#[tokio::test]
async fn test_unparseable_hallucination_can_propagate() {
    let judge = ScriptedClient::new(&["1", "about a third"]);
    let target = StubTarget::new(vec![RawHit::Bare("text".to_string())], "answer");
    let config = EvaluatorConfig {
        hallucination_failure: JudgeFailurePolicy::Propagate,
        ..EvaluatorConfig::default()
    };

    let result = evaluator(judge, config)
        .evaluate(&target, &queries(&["q"]), None)
        .await;

    assert!(matches!(result, Err(AppError::Evaluation(_))));
}

#[tokio::test]
async fn test_judge_transport_error_propagates() {
    let judge = ScriptedClient::failing("judge offline");
    let target = StubTarget::new(vec![RawHit::Bare("text".to_string())], "answer");
    let config = EvaluatorConfig {
        relevance_failure: JudgeFailurePolicy::Absent,
        hallucination_failure: JudgeFailurePolicy::Absent,
        ..EvaluatorConfig::default()
    };

    let result = evaluator(judge, config)
        .evaluate(&target, &queries(&["q"]), None)
        .await;

    assert!(matches!(result, Err(AppError::Llm(_))));
}

#[tokio::test]
async fn test_results_follow_query_order() {
    let judge = ScriptedClient::new(&["1", "0", "0", "0.5", "1", "1"]);
    let target = StubTarget::new(vec![RawHit::Bare("text".to_string())], "answer");

    let results = evaluator(judge, EvaluatorConfig::default())
        .evaluate(&target, &queries(&["a", "b", "c"]), None)
        .await
        .unwrap();

    let order: Vec<&str> = results.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(results[1].retrieval.get(RELEVANCE_KEY), Some(&0.0));
    assert_eq!(results[1].hallucination_rate, Some(0.5));

    let summary = EvaluationSummary::from_results(&results);
    assert_eq!(summary.queries, 3);
    let mean_relevance = summary.retrieval.get(RELEVANCE_KEY).copied().unwrap();
    assert!((mean_relevance - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.hallucination_rate, Some(0.5));
}

#[tokio::test]
async fn test_evaluates_a_retrieval_agent() {
    let agent = RetrievalAgent::builder(
        Box::new(StaticSource::new(medical_drafts())),
        KeywordEmbedder::new(&MEDICAL_KEYWORDS),
        Box::new(MemoryIndex::new()),
    )
    .config(AgentConfig {
        top_k: 1,
        ..AgentConfig::default()
    })
    .build()
    .unwrap();
    agent.ensure_populated().await.unwrap();

    let judge = ScriptedClient::new(&["0"]);
    let gold = HashMap::from([(
        "how do I cook pasta".to_string(),
        "Boil pasta in salted water".to_string(),
    )]);

    let results = evaluator(judge, EvaluatorConfig::default())
        .evaluate(&agent, &queries(&["how do I cook pasta"]), Some(&gold))
        .await
        .unwrap();

    assert_eq!(results[0].retrieval.get(RECALL_KEY), Some(&1.0));
    assert!(results[0].answer.contains("Boil water first."));
}
