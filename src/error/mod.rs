use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for defense pipeline operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Defense pipeline error types
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No quota policy configured for bucket: {0}")]
    PolicyMissing(String),

    #[error("Invalid trusted proxy entry '{0}': {1}")]
    InvalidProxyEntry(String, String),

    #[error("Invalid threat pattern '{0}': {1}")]
    InvalidPattern(String, String),

    #[error("Counter store unavailable: {0}")]
    CounterStoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::PolicyMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::InvalidProxyEntry(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::InvalidPattern(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::CounterStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GuardError::PolicyMissing("admin".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GuardError::CounterStoreUnavailable("timeout".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GuardError::Config("bad".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display() {
        let err = GuardError::PolicyMissing("image".to_string());
        assert_eq!(
            err.to_string(),
            "No quota policy configured for bucket: image"
        );
    }
}
