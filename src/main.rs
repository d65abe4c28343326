mod commands;
mod fetch;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedsync_core::config::FeedSyncConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feedsync")]
#[command(about = "Sync remote ICS feeds into your Radicale calendars without losing local edits")]
struct Cli {
    /// Config file (default: ~/.config/feedsync/config.toml, ~/.feedsync.toml, ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (overrides `loglevel` in the config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every feed and merge it into its calendar
    Sync {
        /// Only sync this project
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Validate the configuration without touching any file
    Check,
    /// Drop the remembered ancestors of a project
    Forget { project: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = FeedSyncConfig::load(cli.config.as_deref())
        .context("Could not load configuration")?;

    let log_level = cli
        .log_level
        .or_else(|| config.log_level())
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&log_level, config.log_file().as_deref())?;

    match cli.command {
        Commands::Sync { project } => commands::sync::run(&config, project.as_deref()).await,
        Commands::Check => commands::check::run(&config),
        Commands::Forget { project } => commands::forget::run(&config, &project),
    }
}

fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Could not open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = log_file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}
