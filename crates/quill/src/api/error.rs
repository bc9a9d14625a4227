//! Backend API error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for backend API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors from the consumed HTTP surface.
///
/// These never propagate past the orchestrating layer; callers map them into
/// notices, `failed` flags, or share-session errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself failed (connect, timeout, body read).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status and a `{detail}` body.
    #[error("{detail}")]
    Http { status: StatusCode, detail: String },

    /// A 2xx body did not match the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the backend rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::Http {
                status: StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN,
                ..
            }
        )
    }
}
