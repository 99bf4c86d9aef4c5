//! Agent command handler.
//!
//! Builds, queries and manages agents described by workspace profiles.

use super::{embedder, generation_client, print_json};
use clap::{Args, Subcommand};
use ragkit_core::{config::AppConfig, AppResult};
use ragkit_knowledge::profile::{list_profiles, load_profile};
use ragkit_knowledge::{
    AgentProfile, PopulateOutcome, RetrievalAgent, SqliteIndex, VectorIndex,
};

/// Build, query and manage agents
#[derive(Args, Debug)]
pub struct AgentCommand {
    #[command(subcommand)]
    pub action: AgentAction,
}

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// Populate an agent's index from its sources
    Build(AgentBuildCommand),
    /// Answer a query
    Ask(AgentAskCommand),
    /// Show the records retrieved for a query
    Retrieve(AgentRetrieveCommand),
    /// Show index statistics
    Stats(AgentStatsCommand),
    /// Empty an agent's persisted index
    Reset(AgentResetCommand),
    /// List agent profiles in the workspace
    List(AgentListCommand),
}

/// Open the agent named by a profile, with a generation client when the
/// profile asks for one.
fn open_agent(
    config: &AppConfig,
    profile: &AgentProfile,
    with_generation: bool,
    rebuild: bool,
) -> AppResult<RetrievalAgent> {
    let client = if with_generation && profile.generation_enabled() {
        Some(generation_client(config)?)
    } else {
        None
    };

    profile.build_agent(
        &config.workspace,
        embedder(config)?,
        client.map(|c| (c, config.model.as_str())),
        rebuild,
    )
}

/// Populate an agent's index
#[derive(Args, Debug)]
pub struct AgentBuildCommand {
    /// Agent name
    pub name: String,

    /// Reset the index and rebuild it from the sources
    #[arg(long)]
    pub rebuild: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON summary of a build; `populated` is false when the index was reused.
fn build_summary(agent: &str, outcome: &PopulateOutcome) -> serde_json::Value {
    serde_json::json!({
        "agent": agent,
        "records": outcome.count(),
        "populated": matches!(outcome, PopulateOutcome::Populated(_)),
    })
}

impl AgentBuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing agent build command for '{}'", self.name);

        let profile = load_profile(&config.workspace, &self.name)?;
        let agent = open_agent(config, &profile, false, self.rebuild)?;
        let outcome = agent.ensure_populated().await?;

        if self.json {
            print_json(&build_summary(agent.name(), &outcome))?;
        } else {
            match outcome {
                PopulateOutcome::Populated(n) => {
                    println!("Indexed {} records for agent '{}'", n, agent.name())
                }
                PopulateOutcome::AlreadyPopulated(n) => println!(
                    "Agent '{}' already holds {} records (use --rebuild to refresh)",
                    agent.name(),
                    n
                ),
            }
        }

        Ok(())
    }
}

/// Answer a query
#[derive(Args, Debug)]
pub struct AgentAskCommand {
    /// Agent name
    pub name: String,

    /// Query text
    pub query: String,

    /// Print retrieved records instead of a generated answer
    #[arg(long)]
    pub no_llm: bool,
}

impl AgentAskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing agent ask command for '{}'", self.name);

        let profile = load_profile(&config.workspace, &self.name)?;
        let agent = open_agent(config, &profile, !self.no_llm, false)?;
        agent.ensure_populated().await?;

        let answer = agent.answer(&self.query).await?;
        println!("{}", answer);

        Ok(())
    }
}

/// Show retrieved records
#[derive(Args, Debug)]
pub struct AgentRetrieveCommand {
    /// Agent name
    pub name: String,

    /// Query text
    pub query: String,

    /// Override the profile's top-k
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AgentRetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing agent retrieve command for '{}'", self.name);

        let mut profile = load_profile(&config.workspace, &self.name)?;
        if let Some(top_k) = self.top_k {
            profile.top_k = top_k;
        }

        let agent = open_agent(config, &profile, false, false)?;
        agent.ensure_populated().await?;
        let hits = agent.retrieve(&self.query).await?;

        if self.json {
            let output = serde_json::json!({
                "agent": agent.name(),
                "query": self.query,
                "scoreKind": agent.score_kind(),
                "hits": hits,
            });
            return print_json(&output);
        }

        if hits.is_empty() {
            println!("No hits");
            return Ok(());
        }

        let label = agent.score_kind().label();
        for (i, hit) in hits.iter().enumerate() {
            println!("{}. [{} {:.3}] {}", i + 1, label, hit.score, hit.source_tag);
            println!("{}", hit.text);
            println!();
        }

        Ok(())
    }
}

/// Show index statistics
#[derive(Args, Debug)]
pub struct AgentStatsCommand {
    /// Agent name
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AgentStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing agent stats command for '{}'", self.name);

        let profile = load_profile(&config.workspace, &self.name)?;
        let Some((db_path, collection)) = profile.sqlite_location(&config.workspace) else {
            println!(
                "Agent '{}' uses an in-memory index; it is populated on every run",
                self.name
            );
            return Ok(());
        };

        let index = SqliteIndex::open(&db_path, collection)?;
        let count = index.count()?;
        let dimension = index.dimension()?;
        let built_at = index.built_at()?;

        if self.json {
            let output = serde_json::json!({
                "agent": profile.name,
                "database": db_path,
                "collection": index.collection(),
                "records": count,
                "dimension": dimension,
                "builtAt": built_at,
            });
            print_json(&output)?;
        } else {
            println!("Agent: {}", profile.name);
            println!("  Database: {}", db_path.display());
            println!("  Collection: {}", index.collection());
            println!("  Records: {}", count);
            if let Some(dimension) = dimension {
                println!("  Dimension: {}", dimension);
            }
            if let Some(built_at) = built_at {
                println!("  Built: {}", built_at);
            }
        }

        Ok(())
    }
}

/// Empty an agent's persisted index
#[derive(Args, Debug)]
pub struct AgentResetCommand {
    /// Agent name
    pub name: String,
}

impl AgentResetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing agent reset command for '{}'", self.name);

        let profile = load_profile(&config.workspace, &self.name)?;
        match profile.sqlite_location(&config.workspace) {
            Some((db_path, collection)) => {
                SqliteIndex::open(&db_path, collection)?.reset()?;
                println!("Index for agent '{}' reset", self.name);
            }
            None => println!("Agent '{}' has no persisted index", self.name),
        }

        Ok(())
    }
}

/// List agent profiles
#[derive(Args, Debug)]
pub struct AgentListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AgentListCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let names = list_profiles(&config.workspace)?;

        if self.json {
            return print_json(&names);
        }

        if names.is_empty() {
            println!("No agents in {}", config.ragkit_dir().join("agents").display());
        }
        for name in names {
            println!("{}", name);
        }
        Ok(())
    }
}

impl AgentCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            AgentAction::Build(cmd) => cmd.execute(config).await,
            AgentAction::Ask(cmd) => cmd.execute(config).await,
            AgentAction::Retrieve(cmd) => cmd.execute(config).await,
            AgentAction::Stats(cmd) => cmd.execute(config).await,
            AgentAction::Reset(cmd) => cmd.execute(config).await,
            AgentAction::List(cmd) => cmd.execute(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_summary_reports_populated() {
        let fresh = build_summary("meddialog", &PopulateOutcome::Populated(4));
        assert_eq!(fresh["populated"], true);
        assert_eq!(fresh["records"], 4);
        assert!(fresh.get("rebuilt").is_none());

        let reused = build_summary("meddialog", &PopulateOutcome::AlreadyPopulated(4));
        assert_eq!(reused["populated"], false);
        assert_eq!(reused["agent"], "meddialog");
    }
}
