//! Sync orchestration: due check, single flight, and the run sequence.
//!
//! Two guards keep runs from overlapping. Inside a process a one-permit
//! semaphore is taken without waiting, and the permit lives in the spawned
//! task. Across processes the persisted `in_progress` flag is claimed with a
//! conditional update before any loader starts.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::dataset::{load_datasets, DatasetConfigError, DatasetKind, DatasetSpec};
use crate::db::Db;
use crate::error::SyncError;
use crate::loader::{IncrementalLoader, LoadError, ReportSource};
use crate::records::{CampaignDailyRecord, GoalColumns, PlacementRecord, SearchQueryRecord};
use crate::status::{SyncState, SyncStatus, SyncStatusStore, SyncStatusUpdate};
use crate::window::{Lookback, SyncWindow};

/// How long a run may hold `in_progress` before it is presumed dead.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 2;

/// What the orchestrator needs to know about the datasets it runs.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub interval: chrono::Duration,
    pub lookback: Lookback,
    pub goals: GoalColumns,
    /// Run order.
    pub datasets: Vec<DatasetSpec>,
}

impl SyncSettings {
    /// Settings with the embedded dataset definitions.
    pub fn from_config(config: &SyncConfig) -> Result<Self, DatasetConfigError> {
        Ok(Self {
            interval: config.sync_interval,
            lookback: config.lookback,
            goals: config.goal_columns(),
            datasets: load_datasets()?,
        })
    }
}

/// Result of a trigger call. Never waits for the run itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
    NotDue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOutcome {
    pub dataset: DatasetKind,
    pub window: SyncWindow,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub record_count: usize,
    pub error: Option<String>,
    /// Datasets that finished before the run ended.
    pub datasets: Vec<DatasetOutcome>,
}

impl SyncOutcome {
    fn failed(error: impl Into<String>, datasets: Vec<DatasetOutcome>) -> Self {
        let record_count = datasets.iter().map(|d| d.record_count).sum();
        Self {
            success: false,
            record_count,
            error: Some(error.into()),
            datasets,
        }
    }
}

/// `never` is always due, a running sync never is, otherwise the interval
/// since the last success must have strictly elapsed.
pub fn is_due_at(status: &SyncStatus, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
    if status.last_status == SyncState::Never {
        return true;
    }
    if status.in_progress {
        return false;
    }
    match status.last_sync_at {
        Some(last) => now - last > interval,
        None => true,
    }
}

struct Inner<S> {
    source: S,
    db: Arc<Mutex<Db>>,
    status: Arc<dyn SyncStatusStore>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    permits: Arc<Semaphore>,
    in_flight: Mutex<Option<JoinHandle<SyncOutcome>>>,
}

/// Runs the dataset loaders under the single-flight guards.
pub struct SyncOrchestrator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SyncOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ReportSource> SyncOrchestrator<S> {
    pub fn new(
        source: S,
        db: Arc<Mutex<Db>>,
        status: Arc<dyn SyncStatusStore>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                db,
                status,
                clock,
                settings,
                permits: Arc::new(Semaphore::new(1)),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        Ok(self.inner.status.read()?)
    }

    pub fn is_due(&self) -> Result<bool, SyncError> {
        let status = self.inner.status.read()?;
        Ok(is_due_at(
            &status,
            self.inner.clock.now(),
            self.inner.settings.interval,
        ))
    }

    /// Starts a background run when one is due. Returns immediately.
    pub fn trigger_if_due(&self) -> Result<TriggerOutcome, SyncError> {
        self.trigger(false)
    }

    /// Starts a background run. `force` skips the interval check but both
    /// guards still apply. Must be called from within a tokio runtime.
    pub fn trigger(&self, force: bool) -> Result<TriggerOutcome, SyncError> {
        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Ok(TriggerOutcome::AlreadyRunning),
        };

        let status = self.inner.status.read()?;
        if status.in_progress {
            return Ok(TriggerOutcome::AlreadyRunning);
        }
        if !force && !is_due_at(&status, self.inner.clock.now(), self.inner.settings.interval) {
            return Ok(TriggerOutcome::NotDue);
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            this.run_supervised().await
        });
        *self.inner.in_flight.lock().expect("in-flight mutex poisoned") = Some(handle);

        tracing::info!("sync started (force = {})", force);
        Ok(TriggerOutcome::Started)
    }

    /// Waits for the run started by the last trigger, if any.
    pub async fn join_in_flight(&self) -> Option<SyncOutcome> {
        let handle = self
            .inner
            .in_flight
            .lock()
            .expect("in-flight mutex poisoned")
            .take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!("sync task ended abnormally: {}", e);
                Some(SyncOutcome::failed(format!("sync task failed: {}", e), Vec::new()))
            }
        }
    }

    /// Runs a sync in the foreground and waits for it.
    pub async fn run(&self) -> SyncOutcome {
        let _permit = match self.inner.permits.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("sync already running in this process");
                return SyncOutcome::failed("sync already in progress", Vec::new());
            }
        };
        self.run_supervised().await
    }

    /// Clears an `in_progress` flag left behind by a run that died.
    ///
    /// Returns `true` when a flag was cleared. A run held by this process is
    /// never considered stale.
    pub fn recover_stale_run(&self, max_age: chrono::Duration) -> Result<bool, SyncError> {
        if self.inner.permits.available_permits() == 0 {
            return Ok(false);
        }
        let status = self.inner.status.read()?;
        if !status.in_progress {
            return Ok(false);
        }

        let now = self.inner.clock.now();
        let stale = match status.last_started_at {
            Some(started) => now - started > max_age,
            None => true,
        };
        if !stale {
            return Ok(false);
        }

        tracing::warn!(
            "recovering abandoned sync run started at {:?}",
            status.last_started_at
        );
        self.inner
            .status
            .write(&SyncStatusUpdate::failed("sync run abandoned before completion"))?;
        Ok(true)
    }

    /// Runs the sync on its own task. A panic or abort there is recorded as
    /// a failure so the persisted `in_progress` flag never outlives the run.
    ///
    /// Caller must hold the in-process permit.
    async fn run_supervised(&self) -> SyncOutcome {
        let this = self.clone();
        match tokio::spawn(async move { this.run_guarded().await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("sync task ended abnormally: {}", e);
                let message = format!("sync task failed: {}", e);
                if let Err(e) = self.inner.status.write(&SyncStatusUpdate::failed(&*message)) {
                    tracing::error!("could not record sync failure: {}", e);
                }
                SyncOutcome::failed(message, Vec::new())
            }
        }
    }

    /// Caller must hold the in-process permit.
    async fn run_guarded(&self) -> SyncOutcome {
        let started = self.inner.clock.now();
        match self.inner.status.try_begin(started) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("sync already in progress elsewhere, not starting");
                return SyncOutcome::failed("sync already in progress", Vec::new());
            }
            Err(e) => {
                tracing::error!("could not mark sync as started: {}", e);
                return SyncOutcome::failed(SyncError::Status(e).to_string(), Vec::new());
            }
        }

        let mut datasets = Vec::with_capacity(self.inner.settings.datasets.len());
        for spec in &self.inner.settings.datasets {
            let window = self.inner.settings.lookback.window_for(spec.window, started);
            match self.load_dataset(spec, &window).await {
                Ok(record_count) => datasets.push(DatasetOutcome {
                    dataset: spec.kind,
                    window,
                    record_count,
                }),
                Err(e) => {
                    let err = SyncError::from_load(spec.kind, e);
                    tracing::error!("sync failed: {}", err);
                    let message = err.to_string();
                    if let Err(e) = self.inner.status.write(&SyncStatusUpdate::failed(&*message)) {
                        tracing::error!("could not record sync failure: {}", e);
                    }
                    return SyncOutcome::failed(message, datasets);
                }
            }
        }

        let record_count: usize = datasets.iter().map(|d| d.record_count).sum();
        let finished = self.inner.clock.now();
        if let Err(e) = self
            .inner
            .status
            .write(&SyncStatusUpdate::completed(finished, record_count as i64))
        {
            tracing::error!("could not record sync completion: {}", e);
            return SyncOutcome::failed(SyncError::Status(e).to_string(), datasets);
        }

        tracing::info!("sync completed: {} records", record_count);
        SyncOutcome {
            success: true,
            record_count,
            error: None,
            datasets,
        }
    }

    async fn load_dataset(&self, spec: &DatasetSpec, window: &SyncWindow) -> Result<usize, LoadError> {
        let goals = &self.inner.settings.goals;
        let source = &self.inner.source;
        let db = &*self.inner.db;
        match spec.kind {
            DatasetKind::CampaignDaily => {
                IncrementalLoader::<CampaignDailyRecord>::from_spec(spec, goals)
                    .load(source, db, window)
                    .await
            }
            DatasetKind::SearchQuery => {
                IncrementalLoader::<SearchQueryRecord>::from_spec(spec, goals)
                    .load(source, db, window)
                    .await
            }
            DatasetKind::Placement => {
                IncrementalLoader::<PlacementRecord>::from_spec(spec, goals)
                    .load(source, db, window)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn status(last_status: SyncState, last_sync_at: Option<DateTime<Utc>>, in_progress: bool) -> SyncStatus {
        SyncStatus {
            last_sync_at,
            last_status,
            last_error: None,
            last_record_count: 0,
            in_progress,
            last_started_at: None,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_synced_is_due() {
        assert!(is_due_at(
            &status(SyncState::Never, None, false),
            noon(),
            Duration::hours(12)
        ));
    }

    #[test]
    fn running_is_not_due() {
        let last = noon() - Duration::days(3);
        assert!(!is_due_at(
            &status(SyncState::Running, Some(last), true),
            noon(),
            Duration::hours(12)
        ));
    }

    #[test]
    fn interval_must_strictly_elapse() {
        let interval = Duration::hours(12);
        let exactly = status(SyncState::Completed, Some(noon() - interval), false);
        let just_under = status(
            SyncState::Completed,
            Some(noon() - interval + Duration::minutes(1)),
            false,
        );
        let just_over = status(
            SyncState::Completed,
            Some(noon() - interval - Duration::minutes(1)),
            false,
        );

        assert!(!is_due_at(&exactly, noon(), interval));
        assert!(!is_due_at(&just_under, noon(), interval));
        assert!(is_due_at(&just_over, noon(), interval));
    }

    #[test]
    fn failed_without_success_is_due() {
        assert!(is_due_at(
            &status(SyncState::Failed, None, false),
            noon(),
            Duration::hours(12)
        ));
    }

    #[test]
    fn outcome_serializes_camel_case() {
        let outcome = SyncOutcome::failed("boom", Vec::new());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["recordCount"], 0);
        assert_eq!(json["error"], "boom");
        assert_eq!(
            serde_json::to_value(TriggerOutcome::AlreadyRunning).unwrap(),
            "already_running"
        );
    }
}
