//! UI-facing event bus.
//!
//! The core never renders anything. Every user-visible state change is
//! published on a broadcast channel so that any frontend (TUI, desktop shell,
//! test harness) can subscribe and redraw. Send failures mean nobody is
//! listening, which is fine.

use std::path::PathBuf;

use tokio::sync::broadcast;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Events published by the client core.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The message list of the given session changed (append, patch, truncate).
    MessagesChanged { session_id: String },
    /// The session list changed (create, delete, rename, refresh).
    SessionsChanged,
    /// A user-facing notice. Failures of background work end up here instead
    /// of being rethrown.
    Notice { level: NoticeLevel, text: String },
    /// The active share session changed (opened, closed, preview resolved).
    ShareChanged,
    /// The frontend should open this URL in a new browsing context
    /// (share intents, OAuth authorization pages).
    OpenUrl(String),
    /// A generated file is ready on disk (share images).
    DownloadReady(PathBuf),
}

/// Broadcast sender for [`ClientEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a bus with the given subscriber buffer size.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Dropped silently when no subscriber is attached.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish a notice.
    pub fn notice(&self, level: NoticeLevel, text: impl Into<String>) {
        self.emit(ClientEvent::Notice {
            level,
            text: text.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
