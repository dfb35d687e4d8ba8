//! Date windows to re-synchronize on each run.
//!
//! A window always ends yesterday so that today's incomplete totals never
//! land in storage. Recent history is re-fetched on every run because the
//! upstream keeps crediting conversions to past days (attribution lag).

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Closed date range `[from, to]` that a load fully replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl SyncWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Which lookback a dataset uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowClass {
    /// High-volume datasets re-fetched over the full trailing lookback.
    Trailing,
    /// Low-frequency dataset with its own, usually shorter, lookback.
    LowFrequency,
}

/// Lookback lengths in days per window class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub trailing_days: u32,
    pub low_frequency_days: u32,
}

impl Default for Lookback {
    fn default() -> Self {
        Self {
            trailing_days: 7,
            low_frequency_days: 3,
        }
    }
}

impl Lookback {
    pub fn days_for(&self, class: WindowClass) -> u32 {
        match class {
            WindowClass::Trailing => self.trailing_days,
            WindowClass::LowFrequency => self.low_frequency_days,
        }
    }

    pub fn window_for(&self, class: WindowClass, now: DateTime<Utc>) -> SyncWindow {
        compute_window(now.date_naive(), self.days_for(class))
    }
}

/// `to` is the day before `today`, `from` is `lookback_days` before `to`.
pub fn compute_window(today: NaiveDate, lookback_days: u32) -> SyncWindow {
    let to = today
        .checked_sub_days(Days::new(1))
        .unwrap_or(NaiveDate::MIN);
    let from = to
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .unwrap_or(NaiveDate::MIN);
    SyncWindow { from, to }
}
