//! Error types for the cloud sync crate.

use thiserror::Error;

/// Result type alias for cloud sync operations.
pub type Result<T> = std::result::Result<T, CloudSyncError>;

/// Retry policy class for batch call failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
}

/// Errors that can occur while talking to the cloud service.
#[derive(Debug, Error)]
pub enum CloudSyncError {
    /// HTTP client error (connection, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status from the cloud service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Server answered but declined the batch as a whole
    #[error("Batch rejected: {0}")]
    Rejected(String),

    /// Invalid request (missing configuration, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CloudSyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(err) if err.is_timeout())
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Json(_) => ApiRetryClass::Retryable,
            Self::Rejected(_) => ApiRetryClass::Retryable,
            Self::InvalidRequest(_) => ApiRetryClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert_eq!(
            CloudSyncError::api(503, "maintenance").retry_class(),
            ApiRetryClass::Retryable
        );
        assert_eq!(
            CloudSyncError::api(429, "slow down").retry_class(),
            ApiRetryClass::Retryable
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = CloudSyncError::api(404, "no such route");
        assert_eq!(err.retry_class(), ApiRetryClass::Permanent);
        assert_eq!(err.to_string(), "API error (404): no such route");
        assert!(!err.is_timeout());
    }
}
