//! Typed client for the consumed HTTP surface.
//!
//! Every backend endpoint the core talks to lives here: session CRUD, the
//! chunked generation stream, feedback, attachments, share formatting and
//! posting, and the OAuth initiate/status/callback trio. Failures are mapped
//! to [`ApiError`] and handled by the orchestration layers, never rethrown
//! further up.

mod client;
mod error;
pub mod types;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
