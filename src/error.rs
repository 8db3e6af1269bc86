use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Unified error type for the Mirage application
#[derive(Error, Debug)]
pub enum MirageError {
    // Request validation errors
    #[error("Missing url")]
    MissingUrl,

    /// Carries the rejected input and parse failure, logged at debug level;
    /// the response body stays generic.
    #[error("Invalid url")]
    InvalidUrl(String),

    // Rate limiting
    #[error("Rate limit exceeded for this URL. Please wait before retrying.")]
    RateLimitExceeded { client: String, target: String },

    // Upstream errors
    #[error("Failed to fetch: {0}")]
    UpstreamFetch(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Mirage operations
pub type Result<T> = std::result::Result<T, MirageError>;

impl MirageError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            MirageError::MissingUrl | MirageError::InvalidUrl(_) => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            MirageError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            MirageError::UpstreamFetch(_)
            | MirageError::InvalidConfig(_)
            | MirageError::MissingEnvVar(_)
            | MirageError::Io(_)
            | MirageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Proxy clients expect the bare message, not a JSON envelope
impl IntoResponse for MirageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

impl From<reqwest::Error> for MirageError {
    fn from(err: reqwest::Error) -> Self {
        MirageError::UpstreamFetch(err.to_string())
    }
}
