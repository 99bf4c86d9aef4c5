//! Web page fetching and HTML-to-text cleaning for scraped records.

use crate::types::RecordDraft;
use async_trait::async_trait;
use ragkit_core::{AppError, AppResult};
use reqwest::Client;
use scraper::{Html, Node};
use std::time::Duration;

/// Default number of characters kept from a page.
pub const DEFAULT_MAX_CHARS: usize = 3000;

/// Per-request timeout for page fetches.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

const SKIPPED_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Fetches raw HTML for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AppResult<String>;
}

/// `PageFetcher` backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    /// Create a fetcher with the default 10 second timeout.
    pub fn new() -> AppResult<Self> {
        Self::with_timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Knowledge(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> AppResult<String> {
        tracing::debug!("Fetching page: {}", url);

        // Error text ends up inside a placeholder record, so keep it unprefixed
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Other(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| AppError::Other(e.to_string()))
    }
}

/// Flatten HTML to whitespace-collapsed text, skipping script/style/noscript.
pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut pieces: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            pieces.push(text);
        }
    }

    pieces
        .iter()
        .flat_map(|piece| piece.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fetch a page and return at most `max_chars` characters of cleaned text.
///
/// Never fails: a fetch error becomes `"Failed to fetch {url}: {error}"`.
pub async fn fetch_page_text(fetcher: &dyn PageFetcher, url: &str, max_chars: usize) -> String {
    match fetcher.fetch(url).await {
        Ok(html) => clean_html(&html).chars().take(max_chars).collect(),
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}", url, e);
            format!("Failed to fetch {}: {}", url, e)
        }
    }
}

/// Record for a scraped page.
pub fn scraped_record(url: &str, page_text: &str) -> RecordDraft {
    RecordDraft::new(format!("{}\n(Source: {})", page_text, url), url)
}
