use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conveyor::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(version, about = "Phase-driven issue pipeline run by an AI coding agent")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Format of log lines on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Repository to operate on (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one phase for the given issues
    Phase {
        /// plan, approve, implement, lint, review, test, human-review or merge
        phase: String,
        /// Issues as ID or ID:TITLE
        #[arg(required = true)]
        issues: Vec<String>,
    },
    /// Run one phase for every open issue waiting on it
    Tick {
        phase: String,
    },
    /// Show where an issue stands in the pipeline
    Status {
        issue: String,
    },
    /// List the pipeline's phases and labels
    Phases,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Create a default conveyor.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let repo_dir = match cli.repo.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // only runs that touch issues keep a log file
    let log_dir = match cli.command {
        Commands::Phase { .. } | Commands::Tick { .. } => Some(repo_dir.join(".conveyor").join("logs")),
        _ => None,
    };
    let _guard = logging::init(cli.verbose, cli.log_format, log_dir.as_deref())?;

    match &cli.command {
        Commands::Phase { phase, issues } => {
            cmd::cmd_phase(&cli, repo_dir, phase, issues).await?
        }
        Commands::Tick { phase } => cmd::cmd_tick(&cli, repo_dir, phase).await?,
        Commands::Status { issue } => cmd::cmd_status(&cli, repo_dir, issue).await?,
        Commands::Phases => cmd::cmd_phases(),
        Commands::Config { command } => cmd::cmd_config(&repo_dir, command.clone())?,
    }

    Ok(())
}
