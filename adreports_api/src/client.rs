//! HTTP client for the report API.
//!
//! Reports are generated asynchronously upstream. A request is answered with
//! either the finished report (200), a "come back later" response (201/202)
//! carrying a `retryIn` hint, or an error. The client re-sends the same
//! request until the report is ready or the attempt ceiling is reached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use url::Url;

use crate::{report::ReportDefinition, sleep::Sleeper, Error, TokioSleeper};

/// Request timeout for a single report call. Online reports can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_BASE_URL: &str = "https://api.direct.yandex.com";
const REPORTS_PATH: &str = "/json/v5/reports";

/// Bounds on how long a report is polled for.
///
/// The ceiling differs per call site: a scheduled sync wants to give up
/// quickly, while a one-off backfill can afford to wait much longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total number of requests, including the first one.
    pub max_attempts: u32,
    /// Wait used when a queued response has no usable `retryIn` header.
    pub default_retry_in: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            default_retry_in: Duration::from_secs(10),
        }
    }
}

/// Poll loop states.
enum PollState {
    Requesting { attempt: u32 },
    Queued { attempt: u32, retry_in: Duration },
    Ready(String),
    Failed(Error),
}

/// What a single request returned.
enum Attempt {
    Ready(String),
    Queued(Duration),
}

/// HTTP client for the report API.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
    client_login: Option<String>,
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Client {
    /// Creates a client pointing at the production API.
    pub fn new(token: &str) -> Result<Self, Error> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    /// Creates a client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, Error> {
        if token.trim().is_empty() {
            return Err(Error::MissingToken);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client_login: None,
            policy: PollPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Sends requests on behalf of an agency client account.
    pub fn with_client_login(mut self, login: &str) -> Self {
        self.client_login = Some(login.to_string());
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    /// Fetches the report for `[from, to]`, polling until it is ready.
    ///
    /// Returns [`Error::Rejected`] as soon as the API answers with an error
    /// status and [`Error::RetryExhausted`] when the report is still queued
    /// after `max_attempts` requests.
    pub async fn fetch_report(
        &self,
        definition: &ReportDefinition,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, Error> {
        let url = self.reports_url()?;
        // Fixed for the whole fetch so every poll asks for the same report.
        let report_name = definition.report_name(from, to, Utc::now());
        let body = definition.to_request_body(from, to, &report_name);
        let max_attempts = self.policy.max_attempts.max(1);

        let mut state = PollState::Requesting { attempt: 1 };
        loop {
            state = match state {
                PollState::Requesting { attempt } => {
                    tracing::debug!(
                        "Requesting report {} (attempt {}/{})",
                        report_name,
                        attempt,
                        max_attempts
                    );
                    match self.request_once(&url, definition, &body).await {
                        Ok(Attempt::Ready(text)) => PollState::Ready(text),
                        Ok(Attempt::Queued(_)) if attempt >= max_attempts => {
                            PollState::Failed(Error::RetryExhausted { attempts: attempt })
                        }
                        Ok(Attempt::Queued(retry_in)) => PollState::Queued { attempt, retry_in },
                        Err(e) => PollState::Failed(e),
                    }
                }
                PollState::Queued { attempt, retry_in } => {
                    tracing::info!(
                        "Report {} queued, retrying in {}s",
                        report_name,
                        retry_in.as_secs()
                    );
                    self.sleeper.sleep(retry_in).await;
                    PollState::Requesting {
                        attempt: attempt + 1,
                    }
                }
                PollState::Ready(text) => return Ok(text),
                PollState::Failed(e) => {
                    tracing::error!("Report {} failed: {}", report_name, e);
                    return Err(e);
                }
            };
        }
    }

    fn reports_url(&self) -> Result<Url, Error> {
        let raw = format!("{}{}", self.base_url, REPORTS_PATH);
        Url::parse(&raw).map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::InvalidUrl(raw)
        })
    }

    async fn request_once(
        &self,
        url: &Url,
        definition: &ReportDefinition,
        body: &serde_json::Value,
    ) -> Result<Attempt, Error> {
        let mut request = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .header("Accept-Language", "en")
            .header("processingMode", definition.processing_mode().as_str())
            .header("returnMoneyInMicros", "false")
            .header("skipReportHeader", "true")
            .header("skipReportSummary", "true")
            .json(body);
        if let Some(login) = &self.client_login {
            request = request.header("Client-Login", login);
        }

        let resp = request.send().await?;
        let status = resp.status();

        match status.as_u16() {
            200 => Ok(Attempt::Ready(resp.text().await?)),
            201 | 202 => {
                let retry_in = resp
                    .headers()
                    .get("retryIn")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(self.policy.default_retry_in);
                Ok(Attempt::Queued(retry_in))
            }
            _ => {
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read response body".to_string());
                Err(Error::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
