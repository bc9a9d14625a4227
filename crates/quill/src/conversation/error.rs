//! Conversation error types.

use thiserror::Error;

use crate::api::ApiError;

use super::store::StoreError;

/// Result type for conversation operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that abort a conversation operation.
///
/// Network failures inside an already-running generation never surface here;
/// they are folded into `failed` message flags and notices instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation failed; the pending action must be aborted.
    #[error("failed to create session: {0}")]
    Create(#[source] ApiError),

    /// Loading a session's history failed.
    #[error("failed to load session: {0}")]
    Load(#[source] ApiError),

    /// Deleting a session failed.
    #[error("failed to delete session: {0}")]
    Delete(#[source] ApiError),

    /// Uploading an attachment failed.
    #[error("failed to upload attachment: {0}")]
    Upload(#[source] ApiError),

    /// A list mutation violated a store invariant.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A destructive list operation was attempted while a generation is
    /// still streaming into the pending turn.
    #[error("a generation is already in progress")]
    GenerationInFlight,

    /// The operation targets a message it is not valid for (e.g., editing an
    /// assistant message or regenerating a user one).
    #[error("{action} is not valid for message {message_id}")]
    InvalidTarget {
        action: &'static str,
        message_id: String,
    },
}
