//! Events carried by the generation stream.

use serde::Deserialize;

use crate::conversation::models::Source;

/// Prefix marking an event-carrying line.
pub const EVENT_PREFIX: &str = "data:";

/// Literal terminal marker. Not an event; must not be JSON-parsed.
pub const DONE_MARKER: &str = "[DONE]";

/// One decoded stream event.
///
/// `Content` fragments accumulate by concatenation in arrival order. `Done`
/// and `Error` are terminal; `Done` carries the authoritative full answer,
/// which may differ from naive fragment concatenation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Snapshot of references collected so far. At most once, before the
    /// terminal event.
    Sources { sources: Vec<Source> },
    /// An incremental content fragment.
    Content { text: String },
    /// Terminal success.
    #[serde(rename_all = "camelCase")]
    Done {
        full_answer: String,
        #[serde(default)]
        token_count: Option<u32>,
        #[serde(default)]
        model_tag: Option<String>,
    },
    /// Terminal failure.
    Error { detail: String },
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}
