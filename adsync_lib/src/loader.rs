//! Incremental window loads: fetch, parse, convert, replace.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use adreports_api::{parse_report, Client, ReportDefinition};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::dataset::DatasetSpec;
use crate::db::{Db, DbError};
use crate::records::{GoalColumns, MetricRecord};
use crate::window::SyncWindow;

/// Anything that can produce a raw tab-separated report.
#[async_trait]
pub trait ReportSource: Send + Sync + 'static {
    async fn fetch_report(
        &self,
        definition: &ReportDefinition,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, adreports_api::Error>;
}

#[async_trait]
impl ReportSource for Client {
    async fn fetch_report(
        &self,
        definition: &ReportDefinition,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, adreports_api::Error> {
        Client::fetch_report(self, definition, from, to).await
    }
}

#[async_trait]
impl<T: ReportSource + ?Sized> ReportSource for Arc<T> {
    async fn fetch_report(
        &self,
        definition: &ReportDefinition,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, adreports_api::Error> {
        (**self).fetch_report(definition, from, to).await
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] adreports_api::Error),
    #[error("storage failed: {0}")]
    Storage(#[from] DbError),
}

/// Loads one dataset's window into its table.
pub struct IncrementalLoader<R> {
    definition: ReportDefinition,
    goals: GoalColumns,
    _record: PhantomData<fn() -> R>,
}

impl<R: MetricRecord> IncrementalLoader<R> {
    pub fn new(definition: ReportDefinition, goals: GoalColumns) -> Self {
        Self {
            definition,
            goals,
            _record: PhantomData,
        }
    }

    pub fn from_spec(spec: &DatasetSpec, goals: &GoalColumns) -> Self {
        Self::new(spec.definition(goals), goals.clone())
    }

    pub fn definition(&self) -> &ReportDefinition {
        &self.definition
    }

    /// Converts report text into records dated inside `window`.
    ///
    /// Rows that fail conversion or fall outside the window are logged and
    /// dropped.
    pub fn records(&self, text: &str, window: &SyncWindow) -> Vec<R> {
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, row) in parse_report(text).enumerate() {
            match R::from_row(&row, &self.goals) {
                Ok(record) if window.contains(record.date()) => records.push(record),
                Ok(record) => {
                    skipped += 1;
                    tracing::warn!(
                        "{}: row {} dated {} is outside {}..{}, skipping",
                        R::KIND,
                        index + 1,
                        record.date(),
                        window.from,
                        window.to
                    );
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("{}: skipping row {}: {}", R::KIND, index + 1, e);
                }
            }
        }
        if skipped > 0 {
            tracing::info!("{}: skipped {} rows", R::KIND, skipped);
        }
        records
    }

    /// Fetches the window's report and replaces the stored window with it.
    ///
    /// Returns the number of rows stored for the window. A fetch failure
    /// leaves storage untouched.
    pub async fn load<S>(
        &self,
        source: &S,
        db: &Mutex<Db>,
        window: &SyncWindow,
    ) -> Result<usize, LoadError>
    where
        S: ReportSource + ?Sized,
    {
        tracing::info!("{}: fetching {}..{}", R::KIND, window.from, window.to);
        let text = source
            .fetch_report(&self.definition, window.from, window.to)
            .await?;

        let records = self.records(&text, window);

        let stored = {
            let mut db = db.lock().expect("db mutex poisoned");
            db.replace_window(window, &records)?
        };
        tracing::info!("{}: stored {} rows", R::KIND, stored);
        Ok(stored)
    }
}
