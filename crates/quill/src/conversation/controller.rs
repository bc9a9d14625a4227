//! Conversation orchestration.
//!
//! The controller is the sole writer of the message store. It reconciles user
//! intents (send, edit, regenerate, resend) with the in-flight generation
//! stream and the session lifecycle, and publishes every visible change on
//! the event bus.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::events::{ClientEvent, EventBus, NoticeLevel};
use crate::stream::{StreamEvent, StreamIngestor};

use super::error::{SessionError, SessionResult};
use super::models::{Attachment, Feedback, Message, MessageRole, SessionSummary, Source};
use super::store::MessageStore;

/// Maximum characters of the first prompt used as a session title.
const TITLE_SEED_LEN: usize = 50;

#[derive(Default)]
struct ConversationState {
    store: MessageStore,
    sessions: Vec<SessionSummary>,
    /// One concurrent generation per session, enforced.
    generation_in_flight: bool,
    /// Monotonic counter used to discard stale load responses.
    load_epoch: u64,
}

/// Orchestrates the message store, the stream ingestor, and the session
/// lifecycle.
pub struct ConversationController {
    api: Arc<ApiClient>,
    state: Mutex<ConversationState>,
    events: EventBus,
}

impl ConversationController {
    pub fn new(api: Arc<ApiClient>, events: EventBus) -> Self {
        Self {
            api,
            state: Mutex::new(ConversationState::default()),
            events,
        }
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    /// Snapshot of the active session's messages.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.store.messages().to_vec()
    }

    /// Snapshot of the session list.
    pub async fn sessions(&self) -> Vec<SessionSummary> {
        self.state.lock().await.sessions.clone()
    }

    /// Id of the active session, if any.
    pub async fn active_session_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .store
            .session_id()
            .map(str::to_string)
    }

    /// Look up one message by id.
    pub async fn message(&self, id: &str) -> Option<Message> {
        self.state.lock().await.store.get(id).cloned()
    }

    /// Resolve the user prompt an assistant message answers, scanning
    /// backward through the live list. Recomputed per call; never cached.
    pub async fn query_for(&self, message_id: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .store
            .query_before(message_id)
            .map(|m| m.content.clone())
    }

    /// Whether a generation is currently running.
    pub async fn generation_in_flight(&self) -> bool {
        self.state.lock().await.generation_in_flight
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Explicitly start a fresh session. Returns the new id.
    pub async fn create_session(&self, seed: Option<&str>) -> SessionResult<String> {
        let title = seed.map(seed_title).unwrap_or_else(|| "New chat".to_string());
        let created = self
            .api
            .create_session(&title)
            .await
            .map_err(SessionError::Create)?;
        {
            let mut st = self.state.lock().await;
            st.store.replace_all(&created.id, Vec::new());
            st.generation_in_flight = false;
        }
        info!("created session {}", created.id);
        self.events.emit(ClientEvent::MessagesChanged {
            session_id: created.id.clone(),
        });
        self.refresh_sessions().await;
        Ok(created.id)
    }

    /// Replace local history with server state for `id`.
    ///
    /// Concurrent loads are serialized through an epoch counter: a response
    /// arriving after a newer load started is discarded.
    pub async fn load_session(&self, id: &str) -> SessionResult<()> {
        let epoch = {
            let mut st = self.state.lock().await;
            st.load_epoch += 1;
            st.load_epoch
        };
        let history = self
            .api
            .fetch_session(id)
            .await
            .map_err(SessionError::Load)?;
        {
            let mut st = self.state.lock().await;
            if st.load_epoch != epoch {
                debug!("discarding stale load response for session {id}");
                return Ok(());
            }
            st.store.replace_all(id, history.messages);
            st.generation_in_flight = false;
        }
        self.events.emit(ClientEvent::MessagesChanged {
            session_id: id.to_string(),
        });
        Ok(())
    }

    /// Delete a session. Clears local state if it was active.
    pub async fn delete_session(&self, id: &str) -> SessionResult<()> {
        self.api
            .delete_session(id)
            .await
            .map_err(SessionError::Delete)?;
        let was_active = {
            let mut st = self.state.lock().await;
            st.sessions.retain(|s| s.id != id);
            let was_active = st.store.session_id() == Some(id);
            if was_active {
                st.store.clear();
                st.generation_in_flight = false;
            }
            was_active
        };
        self.events.emit(ClientEvent::SessionsChanged);
        if was_active {
            self.events.emit(ClientEvent::MessagesChanged {
                session_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Refresh the session list. Best-effort: a failure here must never
    /// surface as a user-visible error.
    pub async fn refresh_sessions(&self) {
        match self.api.list_sessions().await {
            Ok(list) => {
                self.state.lock().await.sessions = list.sessions;
                self.events.emit(ClientEvent::SessionsChanged);
            }
            Err(e) => debug!("session list refresh failed: {e}"),
        }
    }

    // ------------------------------------------------------------------
    // Message operations
    // ------------------------------------------------------------------

    /// Send a user message and stream the assistant reply.
    ///
    /// No-op when the content is blank with no attachments, or when a
    /// generation is already in flight for this session. Appends the user
    /// message and an empty pending assistant turn optimistically, then runs
    /// the stream to completion.
    pub async fn send(&self, content: &str, attachments: Vec<Attachment>) -> SessionResult<()> {
        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return Ok(());
        }

        let existing = {
            let st = self.state.lock().await;
            if st.generation_in_flight {
                debug!("send rejected: generation already in flight");
                return Ok(());
            }
            st.store.session_id().map(str::to_string)
        };

        // First send creates the session. Failure aborts before anything is
        // appended locally.
        let created = match existing {
            Some(_) => None,
            None => Some(
                self.api
                    .create_session(&seed_title(content))
                    .await
                    .map_err(SessionError::Create)?,
            ),
        };

        let attachment_ids: Vec<String> = attachments.iter().map(|a| a.id.clone()).collect();
        let (session_id, user_id) = {
            let mut st = self.state.lock().await;
            // Re-checked under the same lock that installs the session and
            // appends: the creation await above could have raced another
            // send, whose session and optimistic pair must survive.
            if st.generation_in_flight {
                debug!("send rejected: generation started while creating session");
                return Ok(());
            }
            let current = st.store.session_id().map(str::to_string);
            let session_id = match (current, &created) {
                (Some(id), _) => id,
                (None, Some(created)) => {
                    st.store.replace_all(&created.id, Vec::new());
                    created.id.clone()
                }
                (None, None) => {
                    // The session was deleted while we held no lock.
                    debug!("send rejected: session went away");
                    return Ok(());
                }
            };
            let user = Message::user(&session_id, content, attachments);
            let user_id = user.id.clone();
            st.store.push(user)?;
            st.store.push(Message::pending_assistant(&session_id))?;
            st.generation_in_flight = true;
            (session_id, user_id)
        };
        self.emit_messages_changed(&session_id);

        let outcome = self
            .run_generation(&session_id, content, &attachment_ids)
            .await;

        {
            let mut st = self.state.lock().await;
            st.generation_in_flight = false;
            if let Err(ref detail) = outcome {
                st.store.mark_pair_failed(&user_id, detail);
            }
        }
        if let Err(detail) = outcome {
            self.emit_messages_changed(&session_id);
            self.events.notice(NoticeLevel::Error, detail);
        }
        self.refresh_sessions().await;
        Ok(())
    }

    /// Edit a finalized user message: truncate the list at it and re-send the
    /// new content. Destructive once the new request dispatches; rejected
    /// while a generation streams so the list is never truncated without a
    /// dispatch.
    pub async fn edit(&self, message_id: &str, new_content: &str) -> SessionResult<()> {
        let session_id = {
            let mut st = self.state.lock().await;
            if st.generation_in_flight {
                return Err(SessionError::GenerationInFlight);
            }
            let msg = st
                .store
                .get(message_id)
                .ok_or_else(|| not_found(message_id))?;
            if msg.role != MessageRole::User || !msg.finalized {
                return Err(SessionError::InvalidTarget {
                    action: "edit",
                    message_id: message_id.to_string(),
                });
            }
            st.store.truncate_from(message_id)?;
            st.store.session_id().map(str::to_string)
        };
        if let Some(id) = session_id {
            self.emit_messages_changed(&id);
        }
        self.send(new_content, Vec::new()).await
    }

    /// Regenerate a finalized assistant answer from its preceding user
    /// prompt.
    pub async fn regenerate(&self, message_id: &str) -> SessionResult<()> {
        let (session_id, query) = {
            let mut st = self.state.lock().await;
            if st.generation_in_flight {
                return Err(SessionError::GenerationInFlight);
            }
            let msg = st
                .store
                .get(message_id)
                .ok_or_else(|| not_found(message_id))?;
            if msg.role != MessageRole::Assistant || !msg.finalized {
                return Err(SessionError::InvalidTarget {
                    action: "regenerate",
                    message_id: message_id.to_string(),
                });
            }
            let query = st
                .store
                .query_before(message_id)
                .map(|m| m.content.clone())
                .ok_or_else(|| SessionError::InvalidTarget {
                    action: "regenerate",
                    message_id: message_id.to_string(),
                })?;
            st.store.truncate_from(message_id)?;
            (st.store.session_id().map(str::to_string), query)
        };
        if let Some(id) = session_id {
            self.emit_messages_changed(&id);
        }
        self.send(&query, Vec::new()).await
    }

    /// Re-issue a failed exchange: drop the failed pair and send its original
    /// query again.
    pub async fn resend(&self, failed_message_id: &str) -> SessionResult<()> {
        let (session_id, query) = {
            let mut st = self.state.lock().await;
            if st.generation_in_flight {
                return Err(SessionError::GenerationInFlight);
            }
            let msg = st
                .store
                .get(failed_message_id)
                .ok_or_else(|| not_found(failed_message_id))?;
            if !msg.failed {
                return Err(SessionError::InvalidTarget {
                    action: "resend",
                    message_id: failed_message_id.to_string(),
                });
            }
            let query = msg
                .original_query
                .clone()
                .unwrap_or_else(|| msg.content.clone());
            st.store.remove_failed_pair(&query);
            (st.store.session_id().map(str::to_string), query)
        };
        if let Some(id) = session_id {
            self.emit_messages_changed(&id);
        }
        self.send(&query, Vec::new()).await
    }

    /// Record like/dislike feedback. Failures become notices, not errors.
    pub async fn send_feedback(&self, message_id: &str, feedback: Feedback) {
        let kind = match feedback {
            Feedback::Like => "like",
            Feedback::Dislike => "dislike",
            Feedback::None => "none",
        };
        match self.api.send_feedback(message_id, kind).await {
            Ok(()) => {
                let mut st = self.state.lock().await;
                if st.store.set_feedback(message_id, feedback).is_ok() {
                    let session_id = st.store.session_id().map(str::to_string);
                    drop(st);
                    if let Some(id) = session_id {
                        self.emit_messages_changed(&id);
                    }
                }
            }
            Err(e) => {
                warn!("feedback for {message_id} failed: {e}");
                self.events
                    .notice(NoticeLevel::Warning, "Could not record feedback");
            }
        }
    }

    /// Upload a file for attachment to the next send.
    pub async fn upload_attachment(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> SessionResult<Attachment> {
        self.api
            .upload_attachment(filename, bytes)
            .await
            .map_err(SessionError::Upload)
    }

    // ------------------------------------------------------------------
    // Stream read loop
    // ------------------------------------------------------------------

    /// Open the generation stream and apply its events to the pending turn.
    ///
    /// Returns `Err(detail)` on terminal failure (request rejected, transport
    /// error mid-stream, or an `error` event); the caller marks the pair
    /// failed. A transport that closes without a terminal event finalizes the
    /// turn with whatever content accumulated, so no turn is ever left
    /// permanently pending. The response body is dropped on every exit path.
    async fn run_generation(
        &self,
        session_id: &str,
        content: &str,
        attachment_ids: &[String],
    ) -> Result<(), String> {
        let response = self
            .api
            .send_message(session_id, content, attachment_ids.to_vec())
            .await
            .map_err(|e| e.to_string())?;

        let mut ingestor = StreamIngestor::new();
        let mut sources: Vec<Source> = Vec::new();
        let mut finalized = false;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("generation stream broke mid-read: {e}");
                    return Err(format!("Connection lost: {e}"));
                }
            };
            let events = ingestor.feed(&bytes);
            self.apply_events(session_id, events, &mut sources, &mut finalized)
                .await?;
            if ingestor.terminal_seen() {
                // Stop reading; later lines are ignored by contract.
                break;
            }
        }

        if !finalized && !ingestor.terminal_seen() {
            let events = ingestor.finish();
            self.apply_events(session_id, events, &mut sources, &mut finalized)
                .await?;
        }
        if !finalized {
            // Transport ended without done/error (or the literal marker
            // closed the stream). Finalize with the accumulated content.
            let mut st = self.state.lock().await;
            st.store.finalize_pending(None, std::mem::take(&mut sources), None, None);
            drop(st);
            self.emit_messages_changed(session_id);
        }
        Ok(())
    }

    /// Apply decoded events in arrival order. An `error` event aborts with
    /// its detail.
    async fn apply_events(
        &self,
        session_id: &str,
        events: Vec<StreamEvent>,
        sources: &mut Vec<Source>,
        finalized: &mut bool,
    ) -> Result<(), String> {
        for event in events {
            match event {
                StreamEvent::Sources { sources: snapshot } => {
                    *sources = snapshot;
                }
                StreamEvent::Content { text } => {
                    let mut st = self.state.lock().await;
                    st.store.append_content(&text);
                    drop(st);
                    // Reflect the running total immediately so the UI shows
                    // token-by-token growth.
                    self.emit_messages_changed(session_id);
                }
                StreamEvent::Done {
                    full_answer,
                    token_count,
                    model_tag,
                } => {
                    let mut st = self.state.lock().await;
                    st.store.finalize_pending(
                        Some(full_answer),
                        std::mem::take(sources),
                        token_count,
                        model_tag,
                    );
                    drop(st);
                    *finalized = true;
                    self.emit_messages_changed(session_id);
                }
                StreamEvent::Error { detail } => {
                    return Err(detail);
                }
            }
        }
        Ok(())
    }

    fn emit_messages_changed(&self, session_id: &str) {
        self.events.emit(ClientEvent::MessagesChanged {
            session_id: session_id.to_string(),
        });
    }
}

fn not_found(message_id: &str) -> SessionError {
    SessionError::Store(super::store::StoreError::MessageNotFound(
        message_id.to_string(),
    ))
}

/// Derive a session title from the first prompt.
fn seed_title(content: &str) -> String {
    let mut title: String = content.trim().chars().take(TITLE_SEED_LEN).collect();
    if content.trim().chars().count() > TITLE_SEED_LEN {
        title.push('…');
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_title_truncates_on_char_boundary() {
        let long = "é".repeat(80);
        let title = seed_title(&long);
        assert_eq!(title.chars().count(), TITLE_SEED_LEN + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_seed_title_short_prompt_untouched() {
        assert_eq!(seed_title("  hello  "), "hello");
    }
}
