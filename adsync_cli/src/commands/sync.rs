//! The `sync` subcommand: run one sync in the foreground.

use std::path::PathBuf;

use adsync_lib::SyncConfig;
use anyhow::{bail, Result};
use clap::Args;

use crate::output::{print_outcome, OutputFormat};

#[derive(Args)]
pub struct SyncArgs {
    /// Run even if the last success is within the sync interval
    #[arg(long)]
    pub force: bool,

    /// Poll ceiling per report (overrides ADSYNC_MAX_POLL_ATTEMPTS)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// SQLite database path (overrides ADSYNC_DB)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub async fn run(args: &SyncArgs, format: &OutputFormat) -> Result<()> {
    let mut config = SyncConfig::from_env()?;
    if let Some(max_attempts) = args.max_attempts {
        config.poll_policy.max_attempts = max_attempts;
    }
    if let Some(ref db) = args.db {
        config.db_path = db.clone();
    }

    let orchestrator = super::build_orchestrator(&config)?;

    if !args.force && !orchestrator.is_due()? {
        let status = orchestrator.status()?;
        eprintln!(
            "Sync not due (last success {}); use --force to run anyway",
            status
                .last_sync_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
        return Ok(());
    }

    eprintln!("Starting sync into {}", config.db_path.display());
    let outcome = orchestrator.run().await;
    print_outcome(&outcome, format);

    if !outcome.success {
        bail!(
            "sync failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}
