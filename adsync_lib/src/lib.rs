//! Library layer for adsync: incremental report loads into SQLite.
//!
//! Wraps the `adreports_api` client with per-dataset window loaders, a
//! durable sync status record, and an orchestrator that keeps at most one
//! sync in flight.

pub mod clock;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod http;
pub mod loader;
pub mod orchestrator;
pub mod records;
pub mod status;
pub mod window;

pub use adreports_api;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, SyncConfig};
pub use dataset::{load_datasets, DatasetConfigError, DatasetKind, DatasetSpec};
pub use db::{Db, DbError};
pub use error::SyncError;
pub use loader::{IncrementalLoader, LoadError, ReportSource};
pub use orchestrator::{
    DatasetOutcome, SyncOrchestrator, SyncOutcome, SyncSettings, TriggerOutcome,
    DEFAULT_STALE_AFTER_HOURS,
};
pub use records::{
    CampaignDailyRecord, GoalColumns, MetricRecord, PlacementRecord, SearchQueryRecord,
};
pub use status::{SqliteStatusStore, SyncState, SyncStatus, SyncStatusStore, SyncStatusUpdate};
pub use window::{compute_window, Lookback, SyncWindow, WindowClass};
