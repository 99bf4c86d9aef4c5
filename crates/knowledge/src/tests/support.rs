//! Fakes injected through the capability traits.

use crate::embeddings::EmbeddingProvider;
use crate::sources::DocumentSource;
use crate::types::RecordDraft;
use async_trait::async_trait;
use ragkit_core::{AppError, AppResult};
use ragkit_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Generation client replaying canned replies and recording every request.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<AppResult<String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Client whose first call fails with a transport error.
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(AppError::Llm(message.to_string()))])),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Llm("script exhausted".to_string())))?;

        Ok(LlmResponse {
            content: reply,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// Embeds text as keyword presence: dimension `i` is 1.0 when the lowercased
/// text contains keyword `i`.
#[derive(Debug)]
pub struct KeywordEmbedder {
    keywords: Vec<String>,
    batch_calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            batch_calls: AtomicUsize::new(0),
        })
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn provider_name(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-v1"
    }

    fn dimensions(&self) -> usize {
        self.keywords.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                self.keywords
                    .iter()
                    .map(|k| if lower.contains(k.as_str()) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

/// Source returning fixed drafts and counting how often it was asked.
pub struct CountingSource {
    drafts: Vec<RecordDraft>,
    calls: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(drafts: Vec<RecordDraft>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                drafts,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl DocumentSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.drafts.clone())
    }
}

/// Three records about emergency contraception and one unrelated record.
pub fn medical_drafts() -> Vec<RecordDraft> {
    vec![
        RecordDraft::new(
            "Q: What are the side effects of the morning after pill?\nA: Nausea and spotting.",
            "json",
        ),
        RecordDraft::new(
            "Morning-after pill guide (Source: https://www.drugs.com/mtm/morning-after.html)",
            "https://www.drugs.com/mtm/morning-after.html",
        ),
        RecordDraft::new(
            "Q: Can spotting mean pregnancy?\nA: Spotting alone is not a reliable sign.",
            "answer_icliniq",
        ),
        RecordDraft::new("Q: How do I cook pasta?\nA: Boil water first.", "json"),
    ]
}

/// Keywords matching [`medical_drafts`].
pub const MEDICAL_KEYWORDS: [&str; 5] = ["pill", "spotting", "pregnancy", "pasta", "side effects"];
