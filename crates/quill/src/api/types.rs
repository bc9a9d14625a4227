//! Wire shapes of the consumed HTTP surface.

use serde::{Deserialize, Serialize};

use crate::conversation::models::{Message, SessionSummary, Source};
use crate::share::models::Platform;

/// Request to create a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: String,
}

/// Response from session creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub id: String,
}

/// Full history of one session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub messages: Vec<Message>,
}

/// Session list as returned by the history endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
}

/// Request to start a generation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub session_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<String>,
}

/// Request to record feedback on a message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Request to format an answer for a platform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatShareRequest {
    pub answer: String,
    pub sources: Vec<Source>,
    pub platform: Platform,
    pub query: String,
    pub include_hashtags: bool,
}

/// A shareable link to a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub url: String,
}

/// Response to an auth initiation.
///
/// Either the backend already holds a valid token (`access_token`) or it
/// hands back an authorization page plus the state nonce for the poll.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInitiate {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Poll response for an in-progress authorization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Request to exchange an authorization code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCallbackRequest {
    pub platform: Platform,
    pub code: String,
    pub state: String,
}

/// Token obtained from a code exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub access_token: String,
}

/// Request to post directly to a platform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectPostRequest {
    pub platform: Platform,
    pub content: String,
    pub message_id: String,
    pub access_token: String,
}

/// Confirmation of a direct post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReceipt {
    #[serde(default)]
    pub post_url: Option<String>,
}

/// Request to render an answer as an image.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub message_id: String,
    pub content: String,
}

/// Rendered share image.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub image_base64: String,
}

/// Error body shape shared by all endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}
