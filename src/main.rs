//! Thin orchestrator binary: runs exactly one synchronization pass.
//!
//! Usage: `relive-dl [config.json]`. Without an argument the built-in
//! defaults are used. Log verbosity follows `RUST_LOG` (default `info`).

use relive_dl::{Config, Database, SyncEngine};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("synchronization pass failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> relive_dl::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path)),
        None => Ok(Config::default()),
    }
}

async fn run(config: Config) -> relive_dl::Result<()> {
    config.validate()?;

    let db = Arc::new(Database::new(&config.database_path).await?);
    let engine = SyncEngine::new(&config, db)?;
    let summary = engine.run_pass().await?;

    info!(
        talks = summary.talks_seen,
        inserted = summary.talks_inserted,
        updated = summary.talks_updated,
        downloaded = summary.files_downloaded,
        already_present = summary.files_already_present,
        failed = summary.files_failed,
        "done"
    );
    Ok(())
}
