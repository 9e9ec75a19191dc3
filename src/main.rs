use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "toonflow")]
#[command(version, about = "Phase orchestration and revision engine for story-to-film pipelines")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new toonflow project
    Init,
    /// Record the premise and generate the script (and, with auto-advance, the rest)
    Start {
        /// Story premise
        premise: String,
    },
    /// Show pipeline progress and per-phase versions
    Status,
    /// Print a phase's current content
    Show {
        phase: String,
        /// Print every version, oldest first
        #[arg(long)]
        history: bool,
    },
    /// Replace a phase's content; dependents are flagged stale and regenerated
    Edit {
        phase: String,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Leave dependent regenerations queued
        #[arg(long)]
        defer: bool,
    },
    /// Replace one item of a description list or tone list (0-based index)
    EditItem {
        phase: String,
        index: usize,
        value: String,
        #[arg(long)]
        defer: bool,
    },
    /// Regenerate a whole phase, or clear and regenerate one media item
    Regenerate {
        phase: String,
        #[arg(long)]
        index: Option<usize>,
        #[arg(long)]
        defer: bool,
    },
    /// Pin one candidate asset for an image item
    Select {
        phase: String,
        index: usize,
        url: String,
        #[arg(long)]
        defer: bool,
    },
    /// Hand in a result for a deferred run or a stale phase
    Deliver {
        phase: String,
        #[arg(long, conflicts_with_all = ["file", "error"])]
        text: Option<String>,
        #[arg(long, conflicts_with = "error")]
        file: Option<PathBuf>,
        /// Report the generation as failed with this reason
        #[arg(long)]
        error: Option<String>,
    },
    /// Run the next phase after a halt, or retry a failed one
    Continue,
    /// Re-run the failed phase, or roll back and run from an earlier one
    Retry {
        #[arg(long)]
        from: Option<String>,
    },
    /// Dispatch queued regenerations now
    Flush,
    /// Turn auto-advance on or off
    Auto {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// List stale phases and queued regenerations
    Stale,
    /// Inspect or purge the cache of unsaved edits
    Cache {
        #[command(subcommand)]
        command: Option<CacheCommands>,
    },
    /// Discard all content and progress
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// Inspect the revision audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show this session's revisions, optionally for one phase
    Show { phase: Option<String> },
    /// List archived sessions
    Sessions,
    /// Write this session's audit trail as JSON
    Export { output: PathBuf },
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// Show cached edits and how the session was mounted
    Status,
    /// Remove cached edits
    Purge {
        /// Only remove expired entries
        #[arg(long)]
        expired: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default toonflow.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let _log_guard = match toonflow::config::Config::new(&project_dir, cli.verbose) {
        Ok(config) => toonflow::telemetry::init_logging(&config),
        Err(_) => None,
    };

    let dir = project_dir.as_path();
    let verbose = cli.verbose;
    match &cli.command {
        Commands::Init => cmd::cmd_init(dir)?,
        Commands::Start { premise } => cmd::cmd_start(dir, verbose, premise).await?,
        Commands::Status => cmd::cmd_status(dir, verbose)?,
        Commands::Show { phase, history } => cmd::cmd_show(dir, verbose, phase, *history)?,
        Commands::Edit {
            phase,
            text,
            file,
            defer,
        } => {
            cmd::cmd_edit(
                dir,
                verbose,
                phase,
                text.as_deref(),
                file.as_deref(),
                *defer,
            )
            .await?
        }
        Commands::EditItem {
            phase,
            index,
            value,
            defer,
        } => cmd::cmd_edit_item(dir, verbose, phase, *index, value, *defer).await?,
        Commands::Regenerate {
            phase,
            index,
            defer,
        } => cmd::cmd_regenerate(dir, verbose, phase, *index, *defer).await?,
        Commands::Select {
            phase,
            index,
            url,
            defer,
        } => cmd::cmd_select(dir, verbose, phase, *index, url, *defer).await?,
        Commands::Deliver {
            phase,
            text,
            file,
            error,
        } => {
            cmd::cmd_deliver(
                dir,
                verbose,
                phase,
                text.as_deref(),
                file.as_deref(),
                error.as_deref(),
            )
            .await?
        }
        Commands::Continue => cmd::cmd_continue(dir, verbose).await?,
        Commands::Retry { from } => cmd::cmd_retry(dir, verbose, from.as_deref()).await?,
        Commands::Flush => cmd::cmd_flush(dir, verbose).await?,
        Commands::Auto { state } => cmd::cmd_auto(dir, verbose, matches!(state, Toggle::On))?,
        Commands::Stale => cmd::cmd_stale(dir, verbose)?,
        Commands::Cache { command } => cmd::cmd_cache(dir, verbose, command.clone())?,
        Commands::Reset { force } => cmd::cmd_reset(dir, verbose, *force)?,
        Commands::Audit { command } => cmd::cmd_audit(dir, verbose, command)?,
        Commands::Config { command } => cmd::cmd_config(dir, command.clone())?,
    }

    Ok(())
}
