//! # API Error Types
//!
//! Unified error handling for the HTTP layer.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use leaderboard_domain::DomainError;
use leaderboard_persistence::{ErrorKind, PersistenceError};
use thiserror::Error;

/// API-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Unsupported leaderboard window: '{0}'")]
    UnsupportedWindow(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(PersistenceError),

    #[error("Store rejected request: {0}")]
    StoreRejected(PersistenceError),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedWindow(_) => StatusCode::NOT_FOUND,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StoreRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code for response bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::MalformedBody(_) => "MALFORMED_BODY",
            Self::UnsupportedWindow(_) => "UNSUPPORTED_WINDOW",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::StoreRejected(_) => "STORE_REJECTED",
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match (err.kind(), err) {
            (ErrorKind::UnsupportedWindow, PersistenceError::UnsupportedWindow(window)) => {
                Self::UnsupportedWindow(window)
            }
            (ErrorKind::Validation, err) => Self::Validation(err.to_string()),
            (ErrorKind::StoreUnavailable, err) => Self::StoreUnavailable(err),
            (_, err) => Self::StoreRejected(err),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownWindow(window) => Self::UnsupportedWindow(window),
            DomainError::MissingField(_) => Self::Validation(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON that does not fit the payload, e.g. a missing field
            JsonRejection::JsonDataError(err) => Self::Validation(err.body_text()),
            other => Self::MalformedBody(other.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }

        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "code": self.error_code(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_errors_map_by_kind() {
        let err = ApiError::from(PersistenceError::PoolExhausted { timeout_ms: 5 });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::from(PersistenceError::Rejected("EXECABORT".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ApiError::from(PersistenceError::UnsupportedWindow("daily".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "UNSUPPORTED_WINDOW");

        let err = ApiError::from(PersistenceError::InvalidInput("limit".into()));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_domain_errors_are_client_faults() {
        let err = ApiError::from(DomainError::MissingField("uid"));
        assert!(err.status_code().is_client_error());
        let err = ApiError::from(DomainError::UnknownWindow("weekly".into()));
        assert!(err.status_code().is_client_error());
    }
}
