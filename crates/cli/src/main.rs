//! ragkit CLI
//!
//! Main entry point for the ragkit command-line tool.
//! Builds retrieval agents from workspace profiles, answers queries and
//! evaluates agents.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AgentCommand, DemoCommand, EvalCommand};
use ragkit_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// ragkit - retrieval-augmented answering over small knowledge bases
#[derive(Parser, Debug)]
#[command(name = "ragkit")]
#[command(about = "Retrieval-augmented answering over small knowledge bases", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGKIT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, openai)
    #[arg(short, long, global = true, env = "RAGKIT_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "RAGKIT_MODEL")]
    model: Option<String>,

    /// API key for hosted providers
    #[arg(long, global = true, env = "RAGKIT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build, query and manage agents defined in .ragkit/agents/
    Agent(AgentCommand),

    /// Evaluate an agent over a query set
    Eval(EvalCommand),

    /// Run a built-in demo agent over sample queries
    Demo(DemoCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment and config file
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if cli.api_key.is_some() {
        config.api_key = cli.api_key;
    }

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("ragkit starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);
    tracing::debug!(
        "Embedding: {} / {} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    config.ensure_ragkit_dir()?;

    let command_name = match &cli.command {
        Commands::Agent(_) => "agent",
        Commands::Eval(_) => "eval",
        Commands::Demo(_) => "demo",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Agent(cmd) => cmd.execute(&config).await,
        Commands::Eval(cmd) => cmd.execute(&config).await,
        Commands::Demo(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
