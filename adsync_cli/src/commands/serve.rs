//! The `serve` subcommand: HTTP status/trigger endpoints plus a periodic
//! due check.

use std::path::PathBuf;
use std::time::Duration;

use adsync_lib::http;
use adsync_lib::{
    ReportSource, SyncConfig, SyncOrchestrator, TriggerOutcome, DEFAULT_STALE_AFTER_HOURS,
};
use anyhow::{bail, Result};
use chrono::{Timelike, Utc};
use clap::Args;

const MAX_TICK_MINUTES: u64 = 7 * 24 * 60;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Minutes between scheduled due checks (at most one week)
    #[arg(
        long,
        default_value = "15",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TICK_MINUTES)
    )]
    pub tick_minutes: u64,

    /// First UTC hour (0-23) in which scheduled syncs may start
    #[arg(long, requires = "end_hour", value_parser = clap::value_parser!(u32).range(0..24))]
    pub start_hour: Option<u32>,

    /// UTC hour (0-24) at which scheduled syncs stop starting
    #[arg(long, requires = "start_hour", value_parser = clap::value_parser!(u32).range(0..=24))]
    pub end_hour: Option<u32>,

    /// SQLite database path (overrides ADSYNC_DB)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

/// Whether `hour` falls in `[start, end)`. A range with `start > end` wraps
/// past midnight; `start == end` never matches.
pub fn within_hours(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    }
}

pub async fn run(args: &ServeArgs) -> Result<()> {
    let mut config = SyncConfig::from_env()?;
    if let Some(ref db) = args.db {
        config.db_path = db.clone();
    }
    let hours = match (args.start_hour, args.end_hour) {
        (Some(start), Some(end)) if start == end => {
            bail!("--start-hour and --end-hour must differ")
        }
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    };

    let orchestrator = super::build_orchestrator(&config)?;

    tokio::spawn(tick_loop(
        orchestrator.clone(),
        Duration::from_secs(args.tick_minutes * 60),
        hours,
    ));

    let app = http::router(orchestrator);
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    eprintln!("Serving sync endpoints on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn tick_loop<S: ReportSource>(
    orchestrator: SyncOrchestrator<S>,
    every: Duration,
    hours: Option<(u32, u32)>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;

        match orchestrator.recover_stale_run(chrono::Duration::hours(DEFAULT_STALE_AFTER_HOURS)) {
            Ok(true) => tracing::warn!("recovered an abandoned sync run"),
            Ok(false) => {}
            Err(e) => tracing::warn!("stale run check failed: {}", e),
        }

        if let Some((start, end)) = hours {
            let hour = Utc::now().hour();
            if !within_hours(hour, start, end) {
                tracing::debug!("hour {} outside {}..{}, skipping tick", hour, start, end);
                continue;
            }
        }

        match orchestrator.trigger_if_due() {
            Ok(TriggerOutcome::Started) => tracing::info!("scheduled sync started"),
            Ok(outcome) => tracing::debug!("scheduled tick: {:?}", outcome),
            Err(e) => tracing::warn!("scheduled due check failed: {}", e),
        }
    }
}
