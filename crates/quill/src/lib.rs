//! Quill: headless core of a conversational-assistant client.
//!
//! The crate owns three tightly coupled pieces: the streaming ingestion
//! state machine, message/session reconciliation (send, edit, regenerate,
//! resend-after-failure), and the share pipeline with cached per-platform
//! previews and OAuth credential lifecycle. All three mutate one ordered
//! message list under concurrent asynchronous operations; the invariants
//! live in [`conversation::MessageStore`] and are enforced there.
//!
//! Rendering is someone else's job: frontends subscribe to
//! [`events::ClientEvent`]s and read state snapshots through the
//! controller and pipeline accessors.

pub mod api;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod events;
pub mod share;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

pub use api::ApiError;
pub use config::{ClientConfig, init_tracing};
pub use conversation::SessionError;
pub use credentials::{AuthError, CredentialError};
pub use events::{ClientEvent, EventBus, NoticeLevel};
pub use share::ShareError;

/// Fully wired client core.
///
/// Owns the API client, the conversation controller, the share pipeline, and
/// the credential/auth machinery, all sharing one event bus.
pub struct QuillClient {
    config: ClientConfig,
    events: EventBus,
    pub api: Arc<api::ApiClient>,
    pub conversation: Arc<conversation::ConversationController>,
    pub share: Arc<share::SharePipeline>,
    pub credentials: Arc<credentials::CredentialStore>,
    pub auth: Arc<credentials::AuthFlow>,
}

impl QuillClient {
    /// Wire up the core against the configured backend.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let events = EventBus::default();
        let api = Arc::new(
            api::ApiClient::new(
                config.base_url.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )
            .context("building API client")?,
        );
        let credentials = Arc::new(
            credentials::CredentialStore::open(config.credentials_path()?)
                .context("opening credential store")?,
        );
        let conversation = Arc::new(conversation::ConversationController::new(
            Arc::clone(&api),
            events.clone(),
        ));
        let share = Arc::new(share::SharePipeline::new(
            Arc::clone(&api),
            Arc::clone(&conversation),
            Arc::clone(&credentials),
            config.downloads_path(),
            events.clone(),
        ));
        let auth = Arc::new(credentials::AuthFlow::new(
            Arc::clone(&api),
            Arc::clone(&credentials),
            events.clone(),
        ));
        Ok(Self {
            config,
            events,
            api,
            conversation,
            share,
            credentials,
            auth,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to UI-facing events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Restore the session that was active when the process last exited.
    pub async fn restore_last_session(&self) -> Result<()> {
        if let Some(session_id) = self.credentials.active_session() {
            self.conversation
                .load_session(&session_id)
                .await
                .context("restoring last session")?;
        }
        Ok(())
    }

    /// Remember the active session for the next startup and stop background
    /// work.
    pub async fn shutdown(&self) {
        let active = self.conversation.active_session_id().await;
        if let Err(e) = self.credentials.set_active_session(active.as_deref()) {
            tracing::warn!("failed to persist active session: {e}");
        }
        self.auth.cancel().await;
    }
}
