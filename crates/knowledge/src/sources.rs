//! Document sources: where an agent's records come from.

use crate::documents::{self, default_answer_fields, AssemblyMode};
use crate::scrape::{self, PageFetcher, DEFAULT_MAX_CHARS};
use crate::types::{KbRow, RecordDraft, UrlEntry};
use async_trait::async_trait;
use ragkit_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Produces record drafts for an agent's index.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short description for logs.
    fn name(&self) -> &str;

    /// Produce all records, in order.
    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>>;
}

/// Load a knowledge base file (JSON array of row objects) wholesale.
pub fn load_rows(path: &Path) -> AppResult<Vec<KbRow>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Knowledge(format!("Failed to read knowledge base {:?}: {}", path, e))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        AppError::Knowledge(format!("Failed to parse knowledge base {:?}: {}", path, e))
    })
}

/// Knowledge base file run through the document builder.
///
/// Covers plain Q&A, multi-answer assembly and Q&A plus labeled URLs.
#[derive(Debug, Clone)]
pub struct QaFileSource {
    path: PathBuf,
    answer_fields: Vec<String>,
    mode: AssemblyMode,
    urls: Vec<UrlEntry>,
}

impl QaFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            answer_fields: default_answer_fields(),
            mode: AssemblyMode::default(),
            urls: Vec::new(),
        }
    }

    pub fn with_answer_fields(mut self, answer_fields: Vec<String>) -> Self {
        self.answer_fields = answer_fields;
        self
    }

    pub fn with_mode(mut self, mode: AssemblyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_urls(mut self, urls: Vec<UrlEntry>) -> Self {
        self.urls = urls;
        self
    }
}

#[async_trait]
impl DocumentSource for QaFileSource {
    fn name(&self) -> &str {
        "qa-file"
    }

    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>> {
        let rows = load_rows(&self.path)?;
        tracing::info!("Loaded {} rows from {:?}", rows.len(), self.path);
        documents::build(&rows, &self.answer_fields, self.mode, &self.urls)
    }
}

/// Labeled URLs only.
#[derive(Debug, Clone)]
pub struct UrlListSource {
    entries: Vec<UrlEntry>,
}

impl UrlListSource {
    pub fn new(entries: Vec<UrlEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl DocumentSource for UrlListSource {
    fn name(&self) -> &str {
        "url-list"
    }

    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>> {
        Ok(self.entries.iter().map(documents::url_record).collect())
    }
}

/// Plain URLs, fetched and cleaned one after another.
pub struct ScrapeSource {
    urls: Vec<String>,
    fetcher: Arc<dyn PageFetcher>,
    max_chars: usize,
}

impl ScrapeSource {
    pub fn new(urls: Vec<String>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            urls,
            fetcher,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl DocumentSource for ScrapeSource {
    fn name(&self) -> &str {
        "scrape"
    }

    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>> {
        let mut drafts = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            let page_text =
                scrape::fetch_page_text(self.fetcher.as_ref(), url, self.max_chars).await;
            drafts.push(scrape::scraped_record(url, &page_text));
        }
        Ok(drafts)
    }
}

/// Records already in memory.
#[derive(Debug, Clone)]
pub struct StaticSource {
    drafts: Vec<RecordDraft>,
}

impl StaticSource {
    pub fn new(drafts: Vec<RecordDraft>) -> Self {
        Self { drafts }
    }

    /// Run the document builder over in-memory rows.
    pub fn from_rows(
        rows: &[KbRow],
        answer_fields: &[String],
        mode: AssemblyMode,
        urls: &[UrlEntry],
    ) -> AppResult<Self> {
        Ok(Self::new(documents::build(rows, answer_fields, mode, urls)?))
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>> {
        Ok(self.drafts.clone())
    }
}

/// Concatenates sources in order.
pub struct SourceChain {
    sources: Vec<Box<dyn DocumentSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn DocumentSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl DocumentSource for SourceChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn produce_records(&self) -> AppResult<Vec<RecordDraft>> {
        let mut drafts = Vec::new();
        for source in &self.sources {
            let produced = source.produce_records().await?;
            tracing::debug!("Source '{}' produced {} records", source.name(), produced.len());
            drafts.extend(produced);
        }
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapFetcher(HashMap<String, String>);

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> AppResult<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::Other("404 Not Found".to_string()))
        }
    }

    #[tokio::test]
    async fn test_qa_file_source() {
        let temp = TempDir::new().unwrap();
        let kb_path = temp.path().join("kb.json");
        std::fs::write(
            &kb_path,
            r#"[
                {"input": "Q1", "answer_chatgpt": "A1", "answer_icliniq": "B1"},
                {"input": "", "answer_chatgpt": "orphan"}
            ]"#,
        )
        .unwrap();

        let source = QaFileSource::new(&kb_path)
            .with_answer_fields(vec!["answer_chatgpt".into(), "answer_icliniq".into()])
            .with_mode(AssemblyMode::Concat)
            .with_urls(vec![UrlEntry::new("Guide", "https://example.org/guide")]);

        let drafts = source.produce_records().await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].text, "Q: Q1\nA: A1 | B1");
        assert_eq!(drafts[1].source_tag, "https://example.org/guide");
    }

    #[tokio::test]
    async fn test_qa_file_source_missing_file() {
        let source = QaFileSource::new("/nonexistent/kb.json");
        assert!(source.produce_records().await.is_err());
    }

    #[tokio::test]
    async fn test_scrape_source_degrades_on_failure() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://example.org/ok".to_string(),
            "<body><p>Useful text</p></body>".to_string(),
        );
        let source = ScrapeSource::new(
            vec![
                "https://example.org/ok".to_string(),
                "https://example.org/missing".to_string(),
            ],
            Arc::new(MapFetcher(pages)),
        );

        let drafts = source.produce_records().await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].text, "Useful text\n(Source: https://example.org/ok)");
        assert_eq!(
            drafts[1].text,
            "Failed to fetch https://example.org/missing: 404 Not Found\n(Source: https://example.org/missing)"
        );
    }

    #[tokio::test]
    async fn test_source_chain_preserves_order() {
        let chain = SourceChain::new(vec![
            Box::new(StaticSource::new(vec![RecordDraft::new("first", "json")])),
            Box::new(UrlListSource::new(vec![UrlEntry::new(
                "Second",
                "https://example.org/2",
            )])),
        ]);

        let drafts = chain.produce_records().await.unwrap();
        let texts: Vec<&str> = drafts.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "Second (Source: https://example.org/2)"]);
    }
}
