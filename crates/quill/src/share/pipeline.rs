//! Share orchestration.
//!
//! Drives the conversion of one finalized assistant answer into a social
//! post: preview formatting (through the cache), share-intent URLs, direct
//! posting (credential-gated), and image generation. All failures land in
//! the active [`ShareSession`]; nothing is rethrown to callers.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::api::types::{DirectPostRequest, FormatShareRequest, ImageRequest};
use crate::conversation::ConversationController;
use crate::credentials::CredentialStore;
use crate::events::{ClientEvent, EventBus};

use super::cache::SharePreviewCache;
use super::error::{ShareError, ShareResult};
use super::models::{Platform, SharePreview, ShareSession};

/// Orchestrates preview formatting, posting, and image export for one
/// message at a time.
pub struct SharePipeline {
    api: Arc<ApiClient>,
    conversation: Arc<ConversationController>,
    credentials: Arc<CredentialStore>,
    cache: SharePreviewCache,
    /// The single active share session. Switching message or platform
    /// replaces it; reopening the same pair closes it.
    active: Mutex<Option<ShareSession>>,
    downloads_dir: PathBuf,
    events: EventBus,
}

impl SharePipeline {
    pub fn new(
        api: Arc<ApiClient>,
        conversation: Arc<ConversationController>,
        credentials: Arc<CredentialStore>,
        downloads_dir: PathBuf,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            conversation,
            credentials,
            cache: SharePreviewCache::new(),
            active: Mutex::new(None),
            downloads_dir,
            events,
        }
    }

    /// Snapshot of the active share session.
    pub async fn active(&self) -> Option<ShareSession> {
        self.active.lock().await.clone()
    }

    /// Number of cached previews (exposed for tests and debugging).
    pub fn cached_previews(&self) -> usize {
        self.cache.len()
    }

    /// Close the active share session, if any.
    pub async fn close(&self) {
        let closed = self.active.lock().await.take().is_some();
        if closed {
            self.events.emit(ClientEvent::ShareChanged);
        }
    }

    /// Return the preview for (message, platform), formatting on miss.
    ///
    /// Failures are not cached, so the call stays retryable. The preceding
    /// user prompt is resolved from the live list on every call.
    pub async fn ensure_preview(
        &self,
        message_id: &str,
        platform: Platform,
    ) -> ShareResult<SharePreview> {
        if let Some(hit) = self.cache.get(message_id, platform) {
            debug!("preview cache hit for ({message_id}, {platform})");
            return Ok(hit);
        }

        let message = self
            .conversation
            .message(message_id)
            .await
            .filter(|m| m.finalized && !m.failed)
            .ok_or_else(|| ShareError::NotShareable(message_id.to_string()))?;
        let query = self
            .conversation
            .query_for(message_id)
            .await
            .unwrap_or_default();

        let preview = self
            .api
            .format_share(&FormatShareRequest {
                answer: message.content,
                sources: message.sources,
                platform,
                query,
                include_hashtags: true,
            })
            .await
            .map_err(|e| ShareError::Format(e.to_string()))?;
        self.cache.insert(message_id, platform, preview.clone());
        Ok(preview)
    }

    /// Toggle the share session for (message, platform). Reopening the same
    /// pair closes it; anything else opens a fresh session and resolves its
    /// preview.
    pub async fn open_share(&self, message_id: &str, platform: Platform) {
        {
            let mut active = self.active.lock().await;
            if let Some(session) = active.as_ref() {
                if session.message_id == message_id && session.platform == platform {
                    *active = None;
                    drop(active);
                    self.events.emit(ClientEvent::ShareChanged);
                    return;
                }
            }
            let mut session = ShareSession::new(message_id, platform);
            session.loading = true;
            *active = Some(session);
        }
        self.events.emit(ClientEvent::ShareChanged);
        self.resolve_preview(message_id, platform).await;
    }

    /// Switch the active session to another platform in place, fetching only
    /// the new platform's preview. Opens a session when none is active for
    /// this message.
    pub async fn change_platform(&self, message_id: &str, platform: Platform) {
        {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(session) if session.message_id == message_id => {
                    if session.platform == platform {
                        return;
                    }
                    session.platform = platform;
                    session.preview = None;
                    session.loading = true;
                    session.error = None;
                    session.success = None;
                }
                _ => {
                    drop(active);
                    self.open_share(message_id, platform).await;
                    return;
                }
            }
        }
        self.events.emit(ClientEvent::ShareChanged);
        self.resolve_preview(message_id, platform).await;
    }

    /// Build the platform share-intent URL and hand it to the frontend.
    ///
    /// The session link is best effort: its failure downgrades to a plain
    /// text intent and never blocks the share.
    pub async fn open_intent(&self, message_id: &str) {
        let Some((platform, preview)) = self.resolved_preview(message_id).await else {
            return;
        };

        self.patch_active(message_id, |s| s.link_loading = true).await;

        let link = match self.conversation.active_session_id().await {
            Some(session_id) => match self.api.create_share_link(&session_id).await {
                Ok(link) => Some(link.url),
                Err(e) => {
                    debug!("share link generation failed, continuing without: {e}");
                    None
                }
            },
            None => None,
        };

        let url = platform.intent_url(&preview.content.joined(), link.as_deref());
        self.patch_active(message_id, |s| s.link_loading = false).await;
        self.events.emit(ClientEvent::OpenUrl(url));
    }

    /// Post directly to the active platform with the stored credential.
    pub async fn post_directly(&self, message_id: &str) {
        let Some((platform, preview)) = self.resolved_preview(message_id).await else {
            return;
        };

        let Some(token) = self.credentials.token(platform) else {
            self.patch_active(message_id, |s| {
                s.error = Some(ShareError::NotAuthenticated(platform).to_string());
            })
            .await;
            return;
        };

        self.patch_active(message_id, |s| {
            s.posting = true;
            s.error = None;
            s.success = None;
        })
        .await;

        let result = self
            .api
            .post_direct(&DirectPostRequest {
                platform,
                content: preview.content.joined(),
                message_id: message_id.to_string(),
                access_token: token,
            })
            .await;

        match result {
            Ok(receipt) => {
                let text = match receipt.post_url {
                    Some(url) => format!("Posted to {}: {url}", platform.display_name()),
                    None => format!("Posted to {}", platform.display_name()),
                };
                self.patch_active(message_id, |s| {
                    s.posting = false;
                    s.success = Some(text);
                })
                .await;
            }
            Err(e) => {
                // A rejected credential is cleared so the next attempt asks
                // for re-authentication.
                if e.is_unauthorized() {
                    if let Err(err) = self.credentials.clear_token(platform) {
                        warn!("failed to clear rejected credential: {err}");
                    }
                }
                // Surface the backend message verbatim.
                let detail = ShareError::Post(e.to_string()).to_string();
                self.patch_active(message_id, |s| {
                    s.posting = false;
                    s.error = Some(detail);
                })
                .await;
            }
        }
    }

    /// Render the preview as an image and drop it in the downloads
    /// directory. Fire-and-forget: one attempt, no retry.
    pub async fn generate_image(&self, message_id: &str) {
        let Some((_, preview)) = self.resolved_preview(message_id).await else {
            return;
        };

        let outcome = self.fetch_and_store_image(message_id, &preview).await;
        match outcome {
            Ok(path) => self.events.emit(ClientEvent::DownloadReady(path)),
            Err(e) => {
                let detail = e.to_string();
                warn!("share image for {message_id} failed: {detail}");
                self.patch_active(message_id, |s| s.error = Some(detail)).await;
            }
        }
    }

    async fn fetch_and_store_image(
        &self,
        message_id: &str,
        preview: &SharePreview,
    ) -> ShareResult<PathBuf> {
        let payload = self
            .api
            .generate_image(&ImageRequest {
                message_id: message_id.to_string(),
                content: preview.content.joined(),
            })
            .await
            .map_err(|e| ShareError::Image(e.to_string()))?;
        let bytes = BASE64
            .decode(payload.image_base64.trim())
            .map_err(|e| ShareError::Image(format!("invalid image payload: {e}")))?;

        let path = self.downloads_dir.join(format!("quill-share-{message_id}.png"));
        tokio::fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(|e| ShareError::Image(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ShareError::Image(e.to_string()))?;
        Ok(path)
    }

    /// Fetch the preview for (message, platform) and write the result into
    /// the active session, unless the session moved on meanwhile.
    async fn resolve_preview(&self, message_id: &str, platform: Platform) {
        let result = self.ensure_preview(message_id, platform).await;
        {
            let mut active = self.active.lock().await;
            let Some(session) = active.as_mut() else {
                return;
            };
            if session.message_id != message_id || session.platform != platform {
                return;
            }
            session.loading = false;
            match result {
                Ok(preview) => session.preview = Some(preview),
                Err(e) => session.error = Some(e.to_string()),
            }
        }
        self.events.emit(ClientEvent::ShareChanged);
    }

    /// The active session's resolved preview, or record a preview-missing
    /// error on it.
    async fn resolved_preview(&self, message_id: &str) -> Option<(Platform, SharePreview)> {
        let mut active = self.active.lock().await;
        let session = match active.as_mut() {
            Some(s) if s.message_id == message_id => s,
            _ => return None,
        };
        match &session.preview {
            Some(preview) => Some((session.platform, preview.clone())),
            None => {
                session.error = Some(ShareError::PreviewMissing.to_string());
                drop(active);
                self.events.emit(ClientEvent::ShareChanged);
                None
            }
        }
    }

    async fn patch_active(&self, message_id: &str, patch: impl FnOnce(&mut ShareSession)) {
        {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(session) if session.message_id == message_id => patch(session),
                _ => return,
            }
        }
        self.events.emit(ClientEvent::ShareChanged);
    }
}
