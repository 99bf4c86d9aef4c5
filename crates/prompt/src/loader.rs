//! Prompt loader.
//!
//! Built-in prompts ship inside the crate. A workspace can override any of them
//! by placing `<id>.yml` in `.ragkit/prompts/`.

use crate::types::PromptDefinition;
use ragkit_core::{AppError, AppResult};
use std::path::Path;

/// Answer synthesis prompt.
pub const RAG_ANSWER: &str = "rag.answer";

/// Retrieval relevance judge prompt.
pub const JUDGE_RELEVANCE: &str = "judge.relevance";

/// Hallucination rate judge prompt.
pub const JUDGE_HALLUCINATION: &str = "judge.hallucination";

const BUILTIN_PROMPTS: [(&str, &str); 3] = [
    (RAG_ANSWER, include_str!("../prompts/rag.answer.yml")),
    (JUDGE_RELEVANCE, include_str!("../prompts/judge.relevance.yml")),
    (
        JUDGE_HALLUCINATION,
        include_str!("../prompts/judge.hallucination.yml"),
    ),
];

/// Load a prompt definition by ID.
///
/// Looks for `<workspace>/.ragkit/prompts/<id>.yml` first and falls back to the
/// built-in definition.
///
/// # Example
/// ```no_run
/// use ragkit_prompt::{load_prompt, loader::RAG_ANSWER};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), RAG_ANSWER)?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".ragkit/prompts")
        .join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents, &format!("{:?}", prompt_file))?;
        if definition.id != prompt_id {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} declares id '{}', expected '{}'",
                prompt_file, definition.id, prompt_id
            )));
        }
        return Ok(definition);
    }

    builtin_prompt(prompt_id)
}

/// Load a built-in prompt definition by ID.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !(0.0..=2.0).contains(&def.behavior.temperature) {
        return Err(AppError::Prompt(format!(
            "Prompt {} has temperature {} outside 0.0-2.0",
            def.id, def.behavior.temperature
        )));
    }

    Ok(())
}
