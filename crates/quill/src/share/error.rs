//! Share pipeline error types.

use thiserror::Error;

use super::models::Platform;

/// Result type for share operations.
pub type ShareResult<T> = Result<T, ShareError>;

/// Errors confined to the active share session. Recoverable: formatting can
/// be retried, authentication re-run. Nothing here propagates past the
/// pipeline.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The formatting backend rejected or failed the request.
    #[error("{0}")]
    Format(String),

    /// The targeted message is not a finalized assistant answer.
    #[error("message {0} has no shareable answer")]
    NotShareable(String),

    /// An action requiring a resolved preview ran without one.
    #[error("no preview resolved yet")]
    PreviewMissing,

    /// Direct posting requires a stored credential for the platform.
    #[error("connect your {} account before posting", .0.display_name())]
    NotAuthenticated(Platform),

    /// The platform backend rejected the post; detail verbatim.
    #[error("{0}")]
    Post(String),

    /// Image generation or download failed.
    #[error("image generation failed: {0}")]
    Image(String),
}
