//! SQLite storage for synchronized report data and sync status.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::records::MetricRecord;
use crate::status::{SyncState, SyncStatus, SyncStatusUpdate};
use crate::window::SyncWindow;

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("unknown sync status {0:?}")]
    InvalidStatus(String),
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        // Another process may hold the write lock while it commits a window.
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read-side queries and tests).
    #[doc(hidden)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn init(&self) -> Result<(), DbError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.migrate_v1()?;
            self.conn.pragma_update(None, "user_version", 1)?;
        }

        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        Ok(())
    }

    /// Databases created before stale-run recovery lack `last_started_at`.
    fn migrate_v1(&self) -> Result<(), DbError> {
        match self
            .conn
            .execute("ALTER TABLE sync_status ADD COLUMN last_started_at TEXT", [])
        {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.contains("duplicate column name") || msg.contains("no such table") => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Replaces every row of `R`'s table inside `window` with `records`.
    ///
    /// The delete and the inserts share one transaction, so readers see
    /// either the previous snapshot of the window or the new one. Rows with
    /// the same natural key inside `records` collapse to the last one.
    /// Returns the number of rows stored for the window.
    pub fn replace_window<R: MetricRecord>(
        &mut self,
        window: &SyncWindow,
        records: &[R],
    ) -> Result<usize, DbError> {
        let from = window.from.format("%Y-%m-%d").to_string();
        let to = window.to.format("%Y-%m-%d").to_string();

        let tx = self.conn.transaction()?;

        let deleted = tx.execute(
            &format!("DELETE FROM {} WHERE date BETWEEN ?1 AND ?2", R::TABLE),
            params![from, to],
        )?;

        {
            let placeholders = (1..=R::COLUMNS.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                R::TABLE,
                R::COLUMNS.join(", "),
                placeholders
            ))?;
            for record in records {
                stmt.execute(params_from_iter(record.to_values()))?;
            }
        }

        let stored: i64 = tx.query_row(
            &format!("SELECT COUNT(1) FROM {} WHERE date BETWEEN ?1 AND ?2", R::TABLE),
            params![from, to],
            |row| row.get(0),
        )?;

        tx.commit()?;

        tracing::debug!(
            "{}: replaced {} rows with {} for {}..{}",
            R::TABLE,
            deleted,
            stored,
            from,
            to
        );
        Ok(stored as usize)
    }

    /// Number of rows in `table` dated inside `window`.
    pub fn count_in_window(&self, table: &str, window: &SyncWindow) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(1) FROM {} WHERE date BETWEEN ?1 AND ?2", table),
            params![
                window.from.format("%Y-%m-%d").to_string(),
                window.to.format("%Y-%m-%d").to_string()
            ],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_rows(&self, table: &str) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(1) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    fn ensure_status_row(&self) -> Result<(), DbError> {
        self.conn
            .execute("INSERT OR IGNORE INTO sync_status (id) VALUES (1)", [])?;
        Ok(())
    }

    /// Never writes, so a second connection can serve it while another one
    /// holds the write lock for a window load.
    pub fn read_sync_status(&self) -> Result<SyncStatus, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT last_sync_at, last_status, last_error, last_record_count,
                        in_progress, last_started_at
                 FROM sync_status WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let (last_sync_at, last_status, last_error, last_record_count, in_progress, last_started_at) =
            match row {
                Some(fields) => fields,
                None => {
                    return Ok(SyncStatus {
                        last_sync_at: None,
                        last_status: SyncState::Never,
                        last_error: None,
                        last_record_count: 0,
                        in_progress: false,
                        last_started_at: None,
                    })
                }
            };

        Ok(SyncStatus {
            last_sync_at: parse_timestamp(last_sync_at)?,
            last_status: SyncState::parse(&last_status)
                .ok_or(DbError::InvalidStatus(last_status))?,
            last_error,
            last_record_count,
            in_progress,
            last_started_at: parse_timestamp(last_started_at)?,
        })
    }

    /// Applies the fields present in `update` to the status row.
    pub fn write_sync_status(&self, update: &SyncStatusUpdate) -> Result<(), DbError> {
        self.ensure_status_row()?;

        let mut assignments: Vec<(&str, Value)> = Vec::new();
        if let Some(at) = update.last_sync_at {
            assignments.push(("last_sync_at", Value::Text(at.to_rfc3339())));
        }
        if let Some(state) = update.last_status {
            assignments.push(("last_status", Value::Text(state.as_str().to_string())));
        }
        if let Some(ref error) = update.last_error {
            assignments.push((
                "last_error",
                error.clone().map(Value::Text).unwrap_or(Value::Null),
            ));
        }
        if let Some(count) = update.last_record_count {
            assignments.push(("last_record_count", Value::Integer(count)));
        }
        if let Some(in_progress) = update.in_progress {
            assignments.push(("in_progress", Value::Integer(i64::from(in_progress))));
        }
        if let Some(at) = update.last_started_at {
            assignments.push(("last_started_at", Value::Text(at.to_rfc3339())));
        }

        if assignments.is_empty() {
            return Ok(());
        }

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute(
            &format!("UPDATE sync_status SET {} WHERE id = 1", set_clause),
            params_from_iter(assignments.into_iter().map(|(_, v)| v)),
        )?;
        Ok(())
    }

    /// Marks a run as started unless one is already in progress.
    ///
    /// This conditional update is the only place `in_progress` flips from 0
    /// to 1, so two processes racing here cannot both win.
    pub fn try_begin_sync(&self, now: DateTime<Utc>) -> Result<bool, DbError> {
        self.ensure_status_row()?;
        let changed = self.conn.execute(
            "UPDATE sync_status
             SET in_progress = 1, last_status = 'running', last_started_at = ?1
             WHERE id = 1 AND in_progress = 0",
            params![now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    match raw {
        Some(value) => Ok(Some(
            DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc),
        )),
        None => Ok(None),
    }
}
