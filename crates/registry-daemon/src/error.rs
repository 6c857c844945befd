//! Error types for registry-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use registry_doi::DoiError;
use registry_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Lifecycle error
    #[error(transparent)]
    Doi(#[from] DoiError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Doi(error) => match error {
                DoiError::InvalidDoiTransition(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_DOI_TRANSITION")
                }
                DoiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                DoiError::UnauthorizedDoiOperation => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                DoiError::NotFound(_) | DoiError::Storage(StorageError::NotFound(_)) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                DoiError::ConcurrentModification(_) | DoiError::Storage(StorageError::Conflict(_)) => {
                    (StatusCode::CONFLICT, "CONFLICT")
                }
                DoiError::IssuanceExhausted { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ISSUANCE_EXHAUSTED")
                }
                DoiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                DoiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use registry_types::{Doi, DoiKind};

    #[test]
    fn test_api_error_status_codes() {
        let deleted = Doi::parse("10.5072/gone").unwrap();
        assert_eq!(
            ApiError::Doi(DoiError::InvalidDoiTransition(deleted))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );

        assert_eq!(
            ApiError::Doi(DoiError::UnauthorizedDoiOperation)
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );

        assert_eq!(
            ApiError::Doi(DoiError::Storage(StorageError::Conflict("x".into())))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );

        assert_eq!(
            ApiError::Doi(DoiError::IssuanceExhausted {
                kind: DoiKind::Download,
                attempts: 1000
            })
            .into_response()
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        assert_eq!(
            ApiError::Doi(DoiError::Internal("generated suffix".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
