//! Verity CLI
//!
//! Main entry point for the verity command-line tool.
//! Verifies claims against a local vector index, falling back to web search.

mod commands;

use clap::{Parser, Subcommand};
use commands::{IngestCommand, ResetCommand, StatsCommand, VerifyCommand};
use std::path::PathBuf;
use verity_core::{config::AppConfig, logging, AppResult};

/// Verity - cited claim verification over local documents and the web
#[derive(Parser, Debug)]
#[command(name = "verity")]
#[command(about = "Cited claim verification over local documents and the web", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "VERITY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "VERITY_CONFIG")]
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

    /// Reasoning provider (ollama)
    #[arg(short, long, global = true, env = "VERITY_PROVIDER")]
    provider: Option<String>,

    /// Reasoning model identifier
    #[arg(short, long, global = true, env = "VERITY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify one or more claims
    Verify(VerifyCommand),

    /// Add local documents to the vector index
    Ingest(IngestCommand),

    /// Show vector index statistics
    Stats(StatsCommand),

    /// Remove every chunk from the vector index
    Reset(ResetCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let mut config = AppConfig::load()?;

    // A config file given on the command line has not been merged yet
    if let Some(path) = &cli.config {
        if config.config_file.as_ref() != Some(path) {
            config = config.merge_yaml(path)?;
        }
    }

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Verity CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_verity_dir()?;

    let command_name = match &cli.command {
        Commands::Verify(_) => "verify",
        Commands::Ingest(_) => "ingest",
        Commands::Stats(_) => "stats",
        Commands::Reset(_) => "reset",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Verify(cmd) => cmd.execute(&config).await,
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Reset(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
