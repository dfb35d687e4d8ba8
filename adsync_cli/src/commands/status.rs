//! The `status` subcommand: print the sync status record.

use std::path::PathBuf;

use adsync_lib::{SqliteStatusStore, SyncStatusStore};
use anyhow::Result;
use clap::Args;

use crate::output::{print_status, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    /// SQLite database path (defaults to ADSYNC_DB, then adsync.db)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn run(args: &StatusArgs, format: &OutputFormat) -> Result<()> {
    let path = args
        .db
        .clone()
        .or_else(|| std::env::var("ADSYNC_DB").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("adsync.db"));

    let store = SqliteStatusStore::new(super::open_db(&path)?);
    print_status(&store.read()?, format);
    Ok(())
}
