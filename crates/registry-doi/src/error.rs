//! Error types for the DOI lifecycle

use registry_storage::StorageError;
use registry_types::{Doi, DoiKind};
use thiserror::Error;

/// Errors surfaced by DOI lifecycle operations.
///
/// The reconciliation engine itself never fails; everything here originates
/// at a boundary (issuer, stores, caller input) and reaches the caller as-is.
#[derive(Debug, Error)]
pub enum DoiError {
    /// The caller tried to make a DELETED DOI active again
    #[error("DOI {0} is deleted and cannot be assigned as an active identifier")]
    InvalidDoiTransition(Doi),

    /// No collision-free suffix could be found
    #[error("could not issue a new {kind} DOI after {attempts} attempts")]
    IssuanceExhausted { kind: DoiKind, attempts: u32 },

    /// No authenticated principal for a mutating DOI operation
    #[error("authorization is required to perform this operation on DOI")]
    UnauthorizedDoiOperation,

    /// Reserved: updates carry no version check, so concurrent writers to
    /// one entity are not detected and this is never raised.
    #[error("concurrent modification of {0}")]
    ConcurrentModification(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A fault on the registry side, not caused by the caller
    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for DOI lifecycle operations
pub type DoiResult<T> = Result<T, DoiError>;
