use registry_types::{Doi, DoiStatus};
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of the entity and DOI stores
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    NotFound(String),

    /// Unique key taken. The issuer retries on this for DOI reservations.
    #[error("{0}")]
    Conflict(String),

    /// A DOI status may only move forward
    #[error("DOI {doi} cannot move from {from} back to {to}")]
    DoiStatusRegression {
        doi: Doi,
        from: DoiStatus,
        to: DoiStatus,
    },

    #[error("corrupt stored value: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn status_regression(doi: &Doi, from: DoiStatus, to: DoiStatus) -> Self {
        StorageError::DoiStatusRegression {
            doi: doi.clone(),
            from,
            to,
        }
    }
}
