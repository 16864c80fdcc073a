//! Error types for Bookstash
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// No credential state found for the user (401)
    ///
    /// The session cookie may still be valid, but the stored upstream
    /// credentials are gone (expired or deleted). The user must sign
    /// in again.
    #[error("Session expired. Please sign in again.")]
    SessionExpired,

    /// Refresh token exchange was rejected (401)
    ///
    /// Not retryable: the refresh token was revoked or expired
    /// upstream and the user must re-authenticate.
    #[error("Token refresh failed: {0}")]
    AuthRefresh(String),

    /// Upstream API throttling (429)
    ///
    /// Progress already persisted in the current run is kept; the
    /// caller may retry after a pause.
    #[error("Rate limited by the X API. Please wait a few minutes and try again.")]
    RateLimited,

    /// Retrieval tier requires a purchase the user has not made (402)
    #[error("No paid batches available. Purchase more to continue.")]
    QuotaExceeded,

    /// Generic non-success response from the upstream API (502)
    #[error("Upstream API error: {0}")]
    Upstream(String),

    /// Upstream response body did not match the expected shape (502)
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Webhook signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::SessionExpired => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "session_expired")
            }
            AppError::AuthRefresh(_) => (StatusCode::UNAUTHORIZED, self.to_string(), "auth_refresh"),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "invalid_signature",
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                self.to_string(),
                "rate_limited",
            ),
            AppError::QuotaExceeded => (
                StatusCode::PAYMENT_REQUIRED,
                self.to_string(),
                "quota_exceeded",
            ),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), "upstream"),
            AppError::MalformedResponse(_) => (
                StatusCode::BAD_GATEWAY,
                self.to_string(),
                "malformed_response",
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
