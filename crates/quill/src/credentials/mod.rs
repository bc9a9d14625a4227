//! Per-platform OAuth credentials and the authorization flow.

mod oauth;
mod store;

pub use oauth::{AUTH_POLL_CEILING, AUTH_POLL_INTERVAL, AuthError, AuthFlow};
pub use store::{CredentialError, CredentialResult, CredentialStore};
