//! Error types for a synchronization run.

use crate::dataset::DatasetKind;
use crate::db::DbError;
use crate::loader::LoadError;

/// Why a run stopped. Each variant names the dataset that failed.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// The upstream answered with a non-retryable status.
    #[error("{dataset}: report rejected with HTTP {status}: {body}")]
    FetchRejected {
        dataset: DatasetKind,
        status: u16,
        body: String,
    },
    /// The report never became ready within the poll ceiling.
    #[error("{dataset}: report not ready after {attempts} attempts")]
    RetryExhausted { dataset: DatasetKind, attempts: u32 },
    #[error("{dataset}: network error: {message}")]
    Network {
        dataset: DatasetKind,
        message: String,
    },
    /// Parsing succeeded but the storage transaction failed.
    #[error("{dataset}: load failed: {source}")]
    LoadFailed {
        dataset: DatasetKind,
        #[source]
        source: DbError,
    },
    /// Reading or writing the status record failed.
    #[error("sync status error: {0}")]
    Status(#[from] DbError),
}

impl SyncError {
    pub fn from_load(dataset: DatasetKind, err: LoadError) -> Self {
        match err {
            LoadError::Fetch(adreports_api::Error::Rejected { status, body }) => {
                Self::FetchRejected {
                    dataset,
                    status,
                    body,
                }
            }
            LoadError::Fetch(adreports_api::Error::RetryExhausted { attempts }) => {
                Self::RetryExhausted { dataset, attempts }
            }
            LoadError::Fetch(other) => Self::Network {
                dataset,
                message: other.to_string(),
            },
            LoadError::Storage(source) => Self::LoadFailed { dataset, source },
        }
    }

    /// The dataset that failed, if the failure belongs to one.
    pub fn dataset(&self) -> Option<DatasetKind> {
        match self {
            Self::FetchRejected { dataset, .. }
            | Self::RetryExhausted { dataset, .. }
            | Self::Network { dataset, .. }
            | Self::LoadFailed { dataset, .. } => Some(*dataset),
            Self::Status(_) => None,
        }
    }
}
