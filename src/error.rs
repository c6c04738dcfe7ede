use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Malformed search result: {0}")]
    ResultShape(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure is transient and worth retrying with backoff.
    /// Only index connectivity qualifies; everything else is a data or
    /// caller problem that a retry cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::IndexUnavailable(_))
    }

    /// Get a sanitized error message safe for logging
    /// Filters out potentially sensitive information
    pub fn log_safe(&self) -> String {
        match self {
            // Index errors might contain internal URLs or authentication info
            Error::Index(_) => "Vector index operation failed".to_string(),
            Error::IndexUnavailable(_) => "Vector index unreachable".to_string(),

            // Internal errors might contain sensitive details
            Error::Internal(msg) => {
                // Filter out common sensitive patterns
                if msg.to_lowercase().contains("password")
                    || msg.to_lowercase().contains("secret")
                    || msg.to_lowercase().contains("token")
                    || msg.to_lowercase().contains("key")
                {
                    "Internal error (details redacted)".to_string()
                } else {
                    format!("Internal error: {msg}")
                }
            }

            // These errors are generally safe to log as-is
            Error::Normalization(msg) => format!("Normalization error: {msg}"),
            Error::Config(msg) => format!("Configuration error: {msg}"),
            Error::Embedding(msg) => format!("Embedding error: {msg}"),
            Error::Query(msg) => format!("Invalid query: {msg}"),
            Error::ResultShape(msg) => format!("Malformed search result: {msg}"),
            Error::InvalidUrl(_) => "Invalid URL provided".to_string(),
            Error::Io(_) => "File system operation failed".to_string(),
            Error::Json(_) => "JSON serialization failed".to_string(),
            Error::Validation(msg) => format!("Validation error: {msg}"),
        }
    }
}

// Implement IntoResponse for API error handling
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log the full error internally using the safe logging method
        tracing::error!("Request error: {}", self.log_safe());

        let (status, error_message) = match &self {
            Error::Query(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::IndexUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Vector index unavailable".to_string(),
            ),
            Error::Index(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Vector index error".to_string(),
            ),
            Error::ResultShape(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Search returned malformed results".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
