use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while fetching an external source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP request failed, status code: {0}")]
    Status(StatusCode),

    #[error("invalid request URL: {0}")]
    Url(String),
}

/// Errors raised while delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMS notifications are not configured")]
    Disabled,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("failed to reach provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected message ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("provider response missing message id")]
    MissingId,
}

/// Errors raised by state document persistence
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
