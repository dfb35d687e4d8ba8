//! Tab-separated report parsing.
//!
//! The first line of a report holds column names, every following line is one
//! row. Rows are mapped to columns by position; short rows simply lack the
//! trailing columns and long rows drop the extra cells. Cells are kept as raw
//! strings, numeric coercion is left to the caller.

use std::collections::HashMap;

/// Cell value the upstream uses for "no data".
pub const NO_DATA: &str = "--";

/// One report line keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRow {
    cells: HashMap<String, String>,
}

impl ReportRow {
    /// Raw cell for `column`, or `None` when the line was too short.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ReportRow {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self {
            cells: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Lazy iterator over the data lines of a report.
pub struct ReportRows<'a> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<&'a [u8]>,
}

impl Iterator for ReportRows<'_> {
    type Item = ReportRow;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping unreadable report line: {}", e);
                    continue;
                }
            };

            let cells = self
                .headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| {
                    let value = if cell == NO_DATA { "0" } else { cell };
                    (header.clone(), value.to_string())
                })
                .collect();

            return Some(ReportRow { cells });
        }
    }
}

/// Parses a tab-separated report body.
///
/// Empty input and header-only input both yield no rows.
pub fn parse_report(text: &str) -> ReportRows<'_> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.iter().map(str::to_string).collect(),
        Err(e) => {
            tracing::warn!("Report header line is unreadable: {}", e);
            Vec::new()
        }
    };

    ReportRows {
        headers,
        records: reader.into_records(),
    }
}
