//! Error types for the report API client.

/// Errors that can occur while requesting and polling a report.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No API token was configured.
    #[error("API token is missing")]
    MissingToken,
    /// The base URL plus path did not form a valid URL.
    #[error("Invalid report URL: {0}")]
    InvalidUrl(String),
    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The API answered with a non-retryable status. Never retried.
    /// `body` is the response body exactly as received.
    #[error("Report request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The report was still queued when the attempt ceiling was reached.
    #[error("Report not ready after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}
