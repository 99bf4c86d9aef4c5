//! Document builder.
//!
//! Turns knowledge base rows and labeled URLs into record drafts, in input order.

use crate::types::{KbRow, RecordDraft, UrlEntry};
use ragkit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Answer field used when none is configured.
pub const DEFAULT_ANSWER_FIELD: &str = "answer_chatgpt";

/// Tag for records assembled from knowledge base rows in single/concat mode.
pub const JSON_SOURCE_TAG: &str = "json";

/// How answer fields of a row become records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// First configured answer field only
    #[default]
    Single,
    /// All non-empty configured fields joined with `" | "`
    Concat,
    /// One record per non-empty field, tagged with the field name
    Multi,
}

impl AssemblyMode {
    /// Parse mode from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "single" => Some(Self::Single),
            "concat" => Some(Self::Concat),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }
}

/// Default answer field list.
pub fn default_answer_fields() -> Vec<String> {
    vec![DEFAULT_ANSWER_FIELD.to_string()]
}

/// Build record drafts from rows followed by supplementary URL entries.
///
/// Rows without a question produce nothing. URL entries are appended after all
/// rows regardless of mode. Fails only when `answer_fields` is empty.
pub fn build(
    rows: &[KbRow],
    answer_fields: &[String],
    mode: AssemblyMode,
    urls: &[UrlEntry],
) -> AppResult<Vec<RecordDraft>> {
    if answer_fields.is_empty() {
        return Err(AppError::Knowledge(
            "At least one answer field must be configured".to_string(),
        ));
    }

    let mut drafts = Vec::with_capacity(rows.len() + urls.len());

    for (position, row) in rows.iter().enumerate() {
        let Some(question) = row.question() else {
            tracing::debug!("Skipping row {}: empty question", position);
            continue;
        };

        let before = drafts.len();
        match mode {
            AssemblyMode::Single => {
                if let Some(answer) = row.field(&answer_fields[0]) {
                    drafts.push(RecordDraft::new(
                        format!("Q: {}\nA: {}", question, answer),
                        JSON_SOURCE_TAG,
                    ));
                }
            }
            AssemblyMode::Concat => {
                let answers: Vec<&str> = answer_fields
                    .iter()
                    .filter_map(|field| row.field(field))
                    .collect();
                if !answers.is_empty() {
                    drafts.push(RecordDraft::new(
                        format!("Q: {}\nA: {}", question, answers.join(" | ")),
                        JSON_SOURCE_TAG,
                    ));
                }
            }
            AssemblyMode::Multi => {
                for field in answer_fields {
                    if let Some(answer) = row.field(field) {
                        drafts.push(RecordDraft::new(
                            format!("Q: {}\nA ({}): {}", question, field, answer),
                            field.as_str(),
                        ));
                    }
                }
            }
        }

        if drafts.len() == before {
            tracing::debug!("Skipping row {}: no answer in configured fields", position);
        }
    }

    drafts.extend(urls.iter().map(url_record));

    tracing::debug!(
        "Built {} records from {} rows and {} URLs ({:?} mode)",
        drafts.len(),
        rows.len(),
        urls.len(),
        mode
    );

    Ok(drafts)
}

/// Record for a labeled URL.
pub fn url_record(entry: &UrlEntry) -> RecordDraft {
    let url = entry.url.trim();
    RecordDraft::new(
        format!("{} (Source: {})", entry.description.trim(), url),
        url,
    )
}
