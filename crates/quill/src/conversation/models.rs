//! Conversation data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alphabet for locally minted message ids. Collision-resistant even under
/// rapid automated retries, unlike timestamp-derived ids.
const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Mint a new local message id.
pub fn new_message_id() -> String {
    format!("msg_{}", nanoid::nanoid!(21, &ID_ALPHABET))
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// User reaction to an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
    #[default]
    None,
}

/// A reference attached to a finalized assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub title: String,
    pub url: String,
    pub origin_name: String,
    pub category: String,
    pub excerpt: String,
}

/// A file attached to a user message before sending. Immutable after send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

/// One utterance in a conversation.
///
/// `content` is mutable while an assistant message streams and immutable once
/// `finalized` is set. `original_query` survives on failed pairs so that a
/// resend can re-issue the exact user text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_tag: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub finalized: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_query: Option<String>,
}

impl Message {
    /// Build a finalized user message ready for optimistic append.
    pub fn user(session_id: &str, content: &str, attachments: Vec<Attachment>) -> Self {
        Self {
            id: new_message_id(),
            session_id: session_id.to_string(),
            role: MessageRole::User,
            content: content.to_string(),
            created_at: Utc::now(),
            token_count: None,
            model_tag: None,
            sources: Vec::new(),
            attachments,
            feedback: Feedback::None,
            finalized: true,
            failed: false,
            original_query: None,
        }
    }

    /// Build the empty, non-finalized assistant message that a stream will
    /// patch incrementally.
    pub fn pending_assistant(session_id: &str) -> Self {
        Self {
            id: new_message_id(),
            session_id: session_id.to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            token_count: None,
            model_tag: None,
            sources: Vec::new(),
            attachments: Vec::new(),
            feedback: Feedback::None,
            finalized: false,
            failed: false,
            original_query: None,
        }
    }

    /// Whether this message is the in-progress assistant turn.
    pub fn is_pending(&self) -> bool {
        self.role == MessageRole::Assistant && !self.finalized
    }
}

/// Session summary as listed in the sidebar history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
