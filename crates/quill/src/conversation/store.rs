//! Ordered per-session message list.
//!
//! The store owns the messages of the active session and is the only place
//! list structure is mutated. It enforces the core invariant: at most one
//! non-finalized assistant message at any time, and streaming patches apply
//! only to that message.

use tracing::warn;

use super::models::{Feedback, Message, MessageRole, Source};

/// Errors from store mutations that violate list invariants.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// A second non-finalized assistant message was pushed.
    #[error("a generation is already pending in this session")]
    PendingTurnExists,
    /// The referenced message is not in the list.
    #[error("message not found: {0}")]
    MessageNotFound(String),
}

/// Ordered message list for the active session.
#[derive(Debug, Default)]
pub struct MessageStore {
    session_id: Option<String>,
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session the current list belongs to, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace the whole list with server state for `session_id`.
    pub fn replace_all(&mut self, session_id: &str, messages: Vec<Message>) {
        self.session_id = Some(session_id.to_string());
        self.messages = messages;
    }

    /// Drop all local state (active session deleted or cleared).
    pub fn clear(&mut self) {
        self.session_id = None;
        self.messages.clear();
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Append a message, enforcing the single-pending-turn invariant.
    pub fn push(&mut self, message: Message) -> Result<(), StoreError> {
        if message.is_pending() && self.pending().is_some() {
            return Err(StoreError::PendingTurnExists);
        }
        if self.session_id.is_none() {
            self.session_id = Some(message.session_id.clone());
        }
        self.messages.push(message);
        Ok(())
    }

    /// Remove `id` and everything after it. Returns the removed tail.
    pub fn truncate_from(&mut self, id: &str) -> Result<Vec<Message>, StoreError> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))?;
        Ok(self.messages.split_off(idx))
    }

    /// Remove a single message by id.
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let idx = self.index_of(id)?;
        Some(self.messages.remove(idx))
    }

    /// Remove every failed message carrying the given original query, along
    /// with failed messages paired to them. Used by resend.
    pub fn remove_failed_pair(&mut self, original_query: &str) -> Vec<Message> {
        let (removed, kept): (Vec<Message>, Vec<Message>) = self
            .messages
            .drain(..)
            .partition(|m| m.failed && m.original_query.as_deref() == Some(original_query));
        self.messages = kept;
        removed
    }

    /// The single in-progress assistant message, if one exists.
    pub fn pending(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_pending())
    }

    fn pending_mut(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.is_pending())
    }

    /// Append a content fragment to the pending turn. Fragments concatenate
    /// in arrival order; nothing is ever replaced here.
    pub fn append_content(&mut self, delta: &str) {
        match self.pending_mut() {
            Some(msg) => msg.content.push_str(delta),
            None => warn!("content fragment dropped: no pending turn"),
        }
    }

    /// Finalize the pending turn with the authoritative full answer and the
    /// metadata collected during the stream.
    pub fn finalize_pending(
        &mut self,
        full_answer: Option<String>,
        sources: Vec<Source>,
        token_count: Option<u32>,
        model_tag: Option<String>,
    ) {
        let Some(msg) = self.pending_mut() else {
            return;
        };
        if let Some(answer) = full_answer {
            // The terminal event may carry a post-processed answer that
            // differs from naive fragment concatenation.
            msg.content = answer;
        }
        msg.sources = sources;
        msg.token_count = token_count;
        msg.model_tag = model_tag;
        msg.finalized = true;
    }

    /// Mark a user/assistant pair as failed. The user message keeps its
    /// original query for resend; the assistant message keeps any partial
    /// content already streamed and appends the error text.
    pub fn mark_pair_failed(&mut self, user_id: &str, error_text: &str) {
        let original_query = self.get(user_id).map(|m| m.content.clone());
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == user_id) {
            msg.failed = true;
            msg.original_query = original_query.clone();
        }
        if let Some(msg) = self.pending_mut() {
            if !msg.content.is_empty() {
                msg.content.push_str("\n\n");
            }
            msg.content.push_str(error_text);
            msg.failed = true;
            msg.finalized = true;
            msg.original_query = original_query;
        }
    }

    /// Record feedback on a finalized assistant message.
    pub fn set_feedback(&mut self, id: &str, feedback: Feedback) -> Result<(), StoreError> {
        let msg = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))?;
        msg.feedback = feedback;
        Ok(())
    }

    /// Nearest user message at or before `id`, used to resolve the query an
    /// assistant answer responds to.
    pub fn query_before(&self, id: &str) -> Option<&Message> {
        let idx = self.index_of(id)?;
        self.messages[..=idx]
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }
}
