//! Sessions, messages, and the orchestration around them.

mod controller;
mod error;
pub mod models;
mod store;

pub use controller::ConversationController;
pub use error::{SessionError, SessionResult};
pub use store::{MessageStore, StoreError};
