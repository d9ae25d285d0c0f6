// crates/cli/src/main.rs
//! `jobtrail` binary: opens the SQLite history store and runs one command.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use jobtrail_cli::{execute, Cli, CliConfig};
use jobtrail_core::JobHistory;
use jobtrail_db::SqliteStore;
use tracing_subscriber::EnvFilter;

/// Log filter when `JOBTRAIL_LOG` is unset: quiet, stdout is for JSON.
const DEFAULT_LOG_FILTER: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("JOBTRAIL_LOG")
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;

    let store = Arc::new(match &cli.db {
        Some(path) => SqliteStore::new(path).await?,
        None => SqliteStore::open_default().await?,
    });
    tracing::debug!(db = %store.db_path().display(), "Opened history store");

    let registry = config.build_registry(store.clone());
    let ledger = JobHistory::new(store, config.history).with_registry(registry);

    let output = execute(&ledger, &cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
