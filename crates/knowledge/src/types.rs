//! Core types for knowledge records, index entries and hits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the question in a knowledge base row.
pub const QUESTION_FIELD: &str = "input";

/// One object from a knowledge base JSON file.
///
/// Only the `"input"` key has a fixed meaning; answer fields are free-form keys
/// chosen by the caller. Non-string values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KbRow(pub Map<String, Value>);

impl KbRow {
    /// Build a row from `(key, value)` string pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        )
    }

    /// Trimmed string value of a field, `None` when missing, non-string or blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Trimmed question text.
    pub fn question(&self) -> Option<&str> {
        self.field(QUESTION_FIELD)
    }
}

/// A labeled URL used as a supplementary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub description: String,
    pub url: String,
}

impl UrlEntry {
    pub fn new(description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            url: url.into(),
        }
    }
}

/// Builder output before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub text: String,
    pub source_tag: String,
}

impl RecordDraft {
    pub fn new(text: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_tag: source_tag.into(),
        }
    }
}

/// One indexed unit of retrievable text plus its provenance tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Zero-based position in the builder output, stable for one index
    pub id: u64,
    pub text: String,
    pub source_tag: String,
}

/// A record paired with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub record: Record,
    pub vector: Vec<f32>,
}

/// How an index reports closeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Higher is better (cosine similarity)
    Similarity,
    /// Lower is better (cosine distance)
    Distance,
}

impl ScoreKind {
    /// Label used when rendering a hit.
    pub fn label(&self) -> &'static str {
        match self {
            ScoreKind::Similarity => "similarity",
            ScoreKind::Distance => "distance",
        }
    }

    /// Whether `score` satisfies `threshold` under this convention.
    pub fn passes(&self, score: f32, threshold: f32) -> bool {
        match self {
            ScoreKind::Similarity => score >= threshold,
            ScoreKind::Distance => score <= threshold,
        }
    }
}

/// A record returned by a query, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub text: String,
    pub source_tag: String,
    pub score: f32,
}

impl Hit {
    /// Whether the hit's tag looks like a web URL.
    pub fn is_url(&self) -> bool {
        self.source_tag.starts_with("http")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_trims_and_rejects_blank() {
        let row: KbRow = serde_json::from_str(
            r#"{"input": "  What is it?  ", "answer_chatgpt": "   ", "count": 3}"#,
        )
        .unwrap();

        assert_eq!(row.question(), Some("What is it?"));
        assert_eq!(row.field("answer_chatgpt"), None);
        assert_eq!(row.field("count"), None);
        assert_eq!(row.field("missing"), None);
    }

    #[test]
    fn test_score_kind_threshold() {
        assert!(ScoreKind::Similarity.passes(0.3, 0.3));
        assert!(!ScoreKind::Similarity.passes(0.29, 0.3));
        assert!(ScoreKind::Distance.passes(0.2, 0.5));
        assert!(!ScoreKind::Distance.passes(0.6, 0.5));
    }

    #[test]
    fn test_hit_url_detection() {
        let hit = Hit {
            text: "t".to_string(),
            source_tag: "https://example.org".to_string(),
            score: 0.1,
        };
        assert!(hit.is_url());

        let hit = Hit {
            source_tag: "json".to_string(),
            ..hit
        };
        assert!(!hit.is_url());
    }
}
