//! Durable single-row record of sync health.
//!
//! Anyone may read it; only the orchestrator writes it. The persisted
//! `in_progress` flag is what stops two processes from syncing at once.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Db, DbError};

/// Outcome of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Never,
    Running,
    Completed,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "never" => Some(Self::Never),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Completion time of the last successful run.
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_status: SyncState,
    pub last_error: Option<String>,
    pub last_record_count: i64,
    pub in_progress: bool,
    pub last_started_at: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves a field as it is.
///
/// `last_error` is doubly optional so it can be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatusUpdate {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_status: Option<SyncState>,
    pub last_error: Option<Option<String>>,
    pub last_record_count: Option<i64>,
    pub in_progress: Option<bool>,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl SyncStatusUpdate {
    pub fn completed(at: DateTime<Utc>, record_count: i64) -> Self {
        Self {
            last_sync_at: Some(at),
            last_status: Some(SyncState::Completed),
            last_error: Some(None),
            last_record_count: Some(record_count),
            in_progress: Some(false),
            last_started_at: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            last_status: Some(SyncState::Failed),
            last_error: Some(Some(error.into())),
            in_progress: Some(false),
            ..Default::default()
        }
    }
}

/// Read/write access to the sync status record.
pub trait SyncStatusStore: Send + Sync {
    fn read(&self) -> Result<SyncStatus, DbError>;

    fn write(&self, update: &SyncStatusUpdate) -> Result<(), DbError>;

    /// Atomically claims the run: sets `in_progress` and `running` only if no
    /// run is in progress. Returns `false` when another run holds it.
    fn try_begin(&self, now: DateTime<Utc>) -> Result<bool, DbError>;
}

/// Status store backed by the shared SQLite database.
///
/// Writes go through the connection the loaders use. Reads can be given a
/// connection of their own so observers never queue behind a window load.
#[derive(Clone)]
pub struct SqliteStatusStore {
    db: Arc<Mutex<Db>>,
    reader: Option<Arc<Mutex<Db>>>,
}

impl SqliteStatusStore {
    pub fn new(db: Arc<Mutex<Db>>) -> Self {
        Self { db, reader: None }
    }

    /// Serves reads from `reader`, a second connection to the same file.
    pub fn with_reader(mut self, reader: Db) -> Self {
        self.reader = Some(Arc::new(Mutex::new(reader)));
        self
    }
}

impl SyncStatusStore for SqliteStatusStore {
    fn read(&self) -> Result<SyncStatus, DbError> {
        let db = self.reader.as_ref().unwrap_or(&self.db);
        db.lock().expect("db mutex poisoned").read_sync_status()
    }

    fn write(&self, update: &SyncStatusUpdate) -> Result<(), DbError> {
        self.db
            .lock()
            .expect("db mutex poisoned")
            .write_sync_status(update)
    }

    fn try_begin(&self, now: DateTime<Utc>) -> Result<bool, DbError> {
        self.db.lock().expect("db mutex poisoned").try_begin_sync(now)
    }
}
