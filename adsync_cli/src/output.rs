use adsync_lib::{SyncOutcome, SyncStatus};
use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct DatasetRow {
    #[tabled(rename = "Dataset")]
    dataset: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Records")]
    records: usize,
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn build_status_rows(status: &SyncStatus) -> Vec<FieldRow> {
    vec![
        FieldRow {
            field: "Status",
            value: status.last_status.to_string(),
        },
        FieldRow {
            field: "Last success",
            value: format_time(status.last_sync_at),
        },
        FieldRow {
            field: "Last started",
            value: format_time(status.last_started_at),
        },
        FieldRow {
            field: "Records",
            value: status.last_record_count.to_string(),
        },
        FieldRow {
            field: "In progress",
            value: if status.in_progress { "yes" } else { "no" }.to_string(),
        },
        FieldRow {
            field: "Error",
            value: status.last_error.clone().unwrap_or_else(|| "-".to_string()),
        },
    ]
}

fn build_dataset_rows(outcome: &SyncOutcome) -> Vec<DatasetRow> {
    outcome
        .datasets
        .iter()
        .map(|d| DatasetRow {
            dataset: d.dataset.to_string(),
            from: d.window.from.to_string(),
            to: d.window.to.to_string(),
            records: d.record_count,
        })
        .collect()
}

pub fn print_status(status: &SyncStatus, format: &OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new(build_status_rows(status));
            table.with(Style::sharp());
            println!("{}", table);
        }
        OutputFormat::Json => print_json(status),
    }
}

pub fn print_outcome(outcome: &SyncOutcome, format: &OutputFormat) {
    match format {
        OutputFormat::Table => {
            if !outcome.datasets.is_empty() {
                let mut table = Table::new(build_dataset_rows(outcome));
                table.with(Style::sharp());
                println!("{}", table);
            }
            match outcome.error {
                Some(ref error) => eprintln!("Sync failed: {}", error),
                None => eprintln!("Sync complete: {} records", outcome.record_count),
            }
        }
        OutputFormat::Json => print_json(outcome),
    }
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
