//! Eval command handler.
//!
//! Runs an agent over a query set and scores retrieval and answers with the
//! configured judge model.

use super::{embedder, generation_client, print_json};
use clap::{Args, ValueEnum};
use ragkit_core::{config::AppConfig, AppError, AppResult};
use ragkit_knowledge::profile::load_profile;
use ragkit_knowledge::{EvaluationSummary, Evaluator, EvaluatorConfig, JudgeFailurePolicy};
use ragkit_prompt::load_prompt;
use ragkit_prompt::loader::{JUDGE_HALLUCINATION, JUDGE_RELEVANCE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Failure policy as a command-line value.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Propagate,
    Absent,
}

impl From<PolicyArg> for JudgeFailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Propagate => JudgeFailurePolicy::Propagate,
            PolicyArg::Absent => JudgeFailurePolicy::Absent,
        }
    }
}

/// Evaluate an agent over a query set
#[derive(Args, Debug)]
pub struct EvalCommand {
    /// Agent name
    pub name: String,

    /// Queries: a JSON array of strings, or one query per line
    #[arg(long)]
    pub queries: PathBuf,

    /// Gold answers: a JSON object mapping query text to the expected answer
    #[arg(long)]
    pub gold: Option<PathBuf>,

    /// Judge model (defaults to the generation model)
    #[arg(long)]
    pub judge_model: Option<String>,

    /// What to do when the relevance judge reply is not a number
    #[arg(long, value_enum, default_value = "propagate")]
    pub relevance_failure: PolicyArg,

    /// What to do when the hallucination judge reply is not a number
    #[arg(long, value_enum, default_value = "absent")]
    pub hallucination_failure: PolicyArg,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl EvalCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing eval command for agent '{}'", self.name);

        let queries = load_queries(&self.queries)?;
        let gold = self.gold.as_deref().map(load_gold).transpose()?;
        tracing::debug!(
            "Loaded {} queries ({} gold answers)",
            queries.len(),
            gold.as_ref().map_or(0, |g| g.len())
        );

        let profile = load_profile(&config.workspace, &self.name)?;
        let client = generation_client(config)?;
        let embedder = embedder(config)?;

        let generation = profile
            .generation_enabled()
            .then(|| (client.clone(), config.model.as_str()));
        let agent = profile.build_agent(&config.workspace, embedder.clone(), generation, false)?;
        agent.ensure_populated().await?;

        let evaluator_config = EvaluatorConfig {
            relevance_failure: self.relevance_failure.into(),
            hallucination_failure: self.hallucination_failure.into(),
            ..EvaluatorConfig::default()
        };
        let judge_model = self.judge_model.as_deref().unwrap_or(&config.model);
        let evaluator = Evaluator::new(client, judge_model, embedder, evaluator_config)
            .with_prompts(
                load_prompt(&config.workspace, JUDGE_RELEVANCE)?,
                load_prompt(&config.workspace, JUDGE_HALLUCINATION)?,
            );

        let results = evaluator.evaluate(&agent, &queries, gold.as_ref()).await?;
        let summary = EvaluationSummary::from_results(&results);

        if self.json {
            let output = serde_json::json!({
                "agent": agent.name(),
                "results": results,
                "summary": summary,
            });
            return print_json(&output);
        }

        for result in &results {
            println!("Query: {}", result.query);
            for (metric, value) in &result.retrieval {
                println!("  {}: {:.2}", metric, value);
            }
            match result.hallucination_rate {
                Some(rate) => println!("  hallucination_rate: {:.2}", rate),
                None => println!("  hallucination_rate: n/a"),
            }
            println!("  Answer: {}", result.answer);
            println!();
        }

        println!("Summary over {} queries:", summary.queries);
        for (metric, value) in &summary.retrieval {
            println!("  {}: {:.2}", metric, value);
        }
        if let Some(rate) = summary.hallucination_rate {
            println!("  hallucination_rate: {:.2}", rate);
        }

        Ok(())
    }
}

/// Read queries from a JSON array file, falling back to one query per line.
fn load_queries(path: &Path) -> AppResult<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read queries {:?}: {}", path, e)))?;

    let queries = match serde_json::from_str::<Vec<String>>(&contents) {
        Ok(queries) => queries,
        Err(_) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    };

    if queries.is_empty() {
        return Err(AppError::Config(format!("No queries in {:?}", path)));
    }
    Ok(queries)
}

fn load_gold(path: &Path) -> AppResult<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read gold answers {:?}: {}", path, e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| AppError::Serialization(format!("Invalid gold answers {:?}: {}", path, e)))
}
