//! CLI subcommand implementations.

pub mod serve;
pub mod status;
pub mod sync;

use std::path::Path;
use std::sync::{Arc, Mutex};

use adsync_lib::adreports_api::Client;
use adsync_lib::{
    Db, SqliteStatusStore, SyncConfig, SyncOrchestrator, SyncSettings, SystemClock,
    DEFAULT_STALE_AFTER_HOURS,
};
use anyhow::Result;

/// Opens the database and wires an orchestrator around the report client.
///
/// Clears a stale `in_progress` flag left by a crashed process.
pub fn build_orchestrator(config: &SyncConfig) -> Result<SyncOrchestrator<Client>> {
    let db = open_db(&config.db_path)?;
    let store = Arc::new(
        SqliteStatusStore::new(Arc::clone(&db)).with_reader(Db::open(&config.db_path)?),
    );
    let orchestrator = SyncOrchestrator::new(
        config.client()?,
        db,
        store,
        Arc::new(SystemClock),
        SyncSettings::from_config(config)?,
    );

    if orchestrator.recover_stale_run(chrono::Duration::hours(DEFAULT_STALE_AFTER_HOURS))? {
        eprintln!("Recovered an abandoned sync run");
    }
    Ok(orchestrator)
}

pub fn open_db(path: &Path) -> Result<Arc<Mutex<Db>>> {
    let db = Db::open(path)?;
    db.init()?;
    Ok(Arc::new(Mutex::new(db)))
}
