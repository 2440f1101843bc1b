mod config;
mod fetch;
mod merge;
mod pipeline;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::Config;
use fetch::FeedFetcher;
use store::{MemStore, PgStore};

#[derive(Parser)]
#[command(name = "gigcal")]
#[command(about = "Ingest third-party calendar feeds into the canonical event store")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "gigcal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse, and merge every configured feed, then sweep
    Run {
        /// Run against an in-memory store instead of Postgres
        #[arg(long)]
        dry_run: bool,
    },
    /// Only mark elapsed events as past
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { dry_run } => cmd_run(&config, dry_run).await,
        Commands::Sweep => cmd_sweep(&config).await,
    }
}

async fn cmd_run(config: &Config, dry_run: bool) -> Result<()> {
    let fetcher = FeedFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;

    let summary = if dry_run {
        let store = MemStore::new();
        let summary = pipeline::run(config, &fetcher, &store).await?;
        tracing::info!(stored = store.len(), "Dry run complete, nothing persisted");
        summary
    } else {
        let store = connect_store(config).await?;
        pipeline::run(config, &fetcher, &store).await?
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_sweep(config: &Config) -> Result<()> {
    let store = connect_store(config).await?;
    let swept = pipeline::sweep(config, &store).await?;
    println!("{}", serde_json::json!({ "swept": swept }));
    Ok(())
}

async fn connect_store(config: &Config) -> Result<PgStore> {
    let database_url = config.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!(
            "No database_url configured.\n\n\
             Set it in the config file or via GIGCAL_DATABASE_URL, \
             or use `gigcal run --dry-run` to preview without a store."
        )
    })?;
    PgStore::connect(database_url).await
}
