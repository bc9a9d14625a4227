//! Backend HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use super::error::{ApiError, ApiResult};
use super::types::*;
use crate::conversation::models::Attachment;
use crate::share::models::{Platform, SharePreview};

/// Client for the conversational-assistant backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP client. Built without a global timeout so that the chunked
    /// generation stream can outlive ordinary request deadlines; plain
    /// requests get a per-request timeout instead.
    client: Client,
    /// Base URL of the backend (e.g., "http://localhost:8090").
    base_url: String,
    /// Deadline applied to non-streaming requests.
    request_timeout: Duration,
}

impl ApiClient {
    /// Create a new backend client.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Create a new session titled after the first prompt.
    pub async fn create_session(&self, title: &str) -> ApiResult<SessionCreated> {
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .timeout(self.request_timeout)
            .json(&CreateSessionRequest {
                title: title.to_string(),
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Fetch the full message history of a session.
    pub async fn fetch_session(&self, session_id: &str) -> ApiResult<SessionHistory> {
        let response = self
            .client
            .get(self.url(&format!("/api/sessions/{session_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// List all sessions for the sidebar.
    pub async fn list_sessions(&self) -> ApiResult<SessionList> {
        let response = self
            .client
            .get(self.url("/api/sessions"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Delete a session and everything in it.
    pub async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/sessions/{session_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.check_status(response).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Start a generation. Returns the chunked response for the stream
    /// ingestor; only the response head is validated here.
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        attachment_ids: Vec<String>,
    ) -> ApiResult<reqwest::Response> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&SendMessageRequest {
                session_id: session_id.to_string(),
                content: content.to_string(),
                attachment_ids,
            })
            .send()
            .await?;
        self.check_status(response).await
    }

    /// Record like/dislike feedback on a message.
    pub async fn send_feedback(&self, message_id: &str, kind: &str) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url("/api/feedback"))
            .timeout(self.request_timeout)
            .json(&FeedbackRequest {
                message_id: message_id.to_string(),
                kind: kind.to_string(),
            })
            .send()
            .await?;
        self.check_status(response).await?;
        Ok(())
    }

    /// Upload a file to attach to the next user message.
    pub async fn upload_attachment(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<Attachment> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/api/attachments"))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------

    /// Ask the formatting backend for a platform-specific post.
    pub async fn format_share(&self, request: &FormatShareRequest) -> ApiResult<SharePreview> {
        let response = self
            .client
            .post(self.url("/api/share/format"))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Generate a shareable link to a session.
    pub async fn create_share_link(&self, session_id: &str) -> ApiResult<ShareLink> {
        let response = self
            .client
            .post(self.url("/api/share/link"))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "sessionId": session_id }))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Post directly to a platform on the user's behalf.
    pub async fn post_direct(&self, request: &DirectPostRequest) -> ApiResult<PostReceipt> {
        let response = self
            .client
            .post(self.url("/api/share/post"))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Render an answer as a downloadable image.
    pub async fn generate_image(&self, request: &ImageRequest) -> ApiResult<ImagePayload> {
        let response = self
            .client
            .post(self.url("/api/share/image"))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ------------------------------------------------------------------
    // OAuth
    // ------------------------------------------------------------------

    /// Start an authorization flow for a platform.
    pub async fn auth_initiate(&self, platform: Platform) -> ApiResult<AuthInitiate> {
        let response = self
            .client
            .post(self.url("/api/share/auth/initiate"))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "platform": platform }))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Poll the status of an in-progress authorization.
    pub async fn auth_status(&self, platform: Platform, state: &str) -> ApiResult<AuthStatus> {
        let response = self
            .client
            .get(self.url("/api/share/auth/status"))
            .timeout(self.request_timeout)
            .query(&[("platform", platform.to_string()), ("state", state.to_string())])
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Exchange an authorization code delivered by the popup callback.
    pub async fn auth_callback(
        &self,
        platform: Platform,
        code: &str,
        state: &str,
    ) -> ApiResult<AuthToken> {
        let response = self
            .client
            .post(self.url("/api/share/auth/callback"))
            .timeout(self.request_timeout)
            .json(&AuthCallbackRequest {
                platform,
                code: code.to_string(),
                state: state.to_string(),
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Handle a response and parse the JSON body or the `{detail}` error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ApiResult<T> {
        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("unexpected response body: {e}")))
    }

    /// Map non-2xx responses to [`ApiError::Http`], reading the `{detail}`
    /// body when the backend provides one.
    async fn check_status(&self, response: reqwest::Response) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = match response.json::<ApiErrorBody>().await {
            Ok(body) => body.detail,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(ApiError::Http { status, detail })
    }
}
