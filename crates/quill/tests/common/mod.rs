//! Test utilities: a scriptable mock backend.
//!
//! Stands up a real HTTP server speaking the consumed surface, with knobs
//! for scripting the chat stream chunk-by-chunk, delaying session loads, and
//! steering the OAuth endpoints.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{Value, json};

/// One scripted chat response: chunks streamed with a fixed delay between
/// them.
#[derive(Debug, Clone)]
pub struct StreamScript {
    pub chunks: Vec<Vec<u8>>,
    pub delay: Duration,
}

impl StreamScript {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            chunks: chunks
                .into_iter()
                .map(|c| c.as_ref().as_bytes().to_vec())
                .collect(),
            delay: Duration::from_millis(5),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The usual happy path: one content fragment, then done.
    pub fn simple(answer: &str) -> Self {
        Self::new(vec![
            &format!(
                "data: {}\ndata: {}\n",
                json!({"type": "content", "text": answer}),
                json!({"type": "done", "fullAnswer": answer}),
            ),
        ])
    }
}

#[derive(Default)]
pub struct MockState {
    session_counter: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub format_calls: AtomicUsize,
    pub link_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    /// Scripts consumed FIFO by /api/chat; empty queue falls back to
    /// [`StreamScript::simple`].
    pub chat_scripts: Mutex<VecDeque<StreamScript>>,
    /// Session ids whose history load is held back briefly.
    pub slow_session_loads: Mutex<Vec<String>>,
    /// When set, auth initiate reports already-authenticated.
    pub preauthorized: AtomicBool,
    /// Number of status polls answered "pending" before success.
    pub status_pending_polls: AtomicUsize,
}

impl MockState {
    pub fn push_script(&self, script: StreamScript) {
        self.chat_scripts.lock().unwrap().push_back(script);
    }
}

/// Spawn the mock backend, returning its base URL.
pub async fn spawn_backend(state: Arc<MockState>) -> String {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route(
            "/api/sessions/{id}",
            get(fetch_session).delete(delete_session),
        )
        .route("/api/chat", post(chat))
        .route("/api/attachments", post(upload_attachment))
        .route("/api/feedback", post(ok_no_content))
        .route("/api/share/format", post(format_share))
        .route("/api/share/link", post(share_link))
        .route("/api/share/post", post(direct_post))
        .route("/api/share/image", post(share_image))
        .route("/api/share/auth/initiate", post(auth_initiate))
        .route("/api/share/auth/status", get(auth_status))
        .route("/api/share/auth/callback", post(auth_callback))
        .with_state(state)
}

async fn create_session(State(state): State<Arc<MockState>>) -> Json<Value> {
    let n = state.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "id": format!("ses-{n}") }))
}

async fn list_sessions() -> Json<Value> {
    Json(json!({ "sessions": [] }))
}

async fn fetch_session(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let slow = state.slow_session_loads.lock().unwrap().contains(&id);
    if slow {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    Json(json!({
        "messages": [{
            "id": format!("srv-{id}-u1"),
            "sessionId": id,
            "role": "user",
            "content": format!("history of {id}"),
            "createdAt": "2025-01-01T00:00:00Z",
            "finalized": true
        }]
    }))
}

async fn delete_session() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn ok_no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn upload_attachment(mut multipart: axum::extract::Multipart) -> Json<Value> {
    let mut filename = "upload.bin".to_string();
    let mut size = 0;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if let Some(name) = field.file_name() {
            filename = name.to_string();
        }
        size = field.bytes().await.unwrap().len() as u64;
    }
    Json(json!({
        "id": "att-1",
        "filename": filename,
        "type": "document",
        "size": size,
        "uploadedAt": "2025-01-01T00:00:00Z",
        "processed": true
    }))
}

async fn chat(State(state): State<Arc<MockState>>) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    let script = state
        .chat_scripts
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| StreamScript::simple("mock answer"));

    let delay = script.delay;
    let stream = futures::stream::iter(script.chunks.into_iter())
        .then(move |chunk| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, Infallible>(chunk)
        });
    Body::from_stream(stream).into_response()
}

async fn format_share(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.format_calls.fetch_add(1, Ordering::SeqCst);
    let platform = body["platform"].as_str().unwrap_or("twitter");
    let answer = body["answer"].as_str().unwrap_or_default();
    Json(json!({
        "platform": platform,
        "content": format!("[{platform}] {answer}"),
        "characterCount": answer.len(),
        "hashtags": ["#quill"]
    }))
}

async fn share_link(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Json<Value> {
    state.link_calls.fetch_add(1, Ordering::SeqCst);
    let session = body["sessionId"].as_str().unwrap_or("unknown");
    Json(json!({ "url": format!("https://q.example/s/{session}") }))
}

async fn direct_post(Json(body): Json<Value>) -> Response {
    if body["accessToken"].as_str() == Some("good-token") {
        Json(json!({ "postUrl": "https://social.example/p/1" })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "token rejected by platform" })),
        )
            .into_response()
    }
}

async fn share_image() -> Json<Value> {
    use base64::Engine as _;
    let png = b"\x89PNG\r\n\x1a\nfake";
    Json(json!({
        "imageBase64": base64::engine::general_purpose::STANDARD.encode(png)
    }))
}

async fn auth_initiate(State(state): State<Arc<MockState>>) -> Json<Value> {
    if state.preauthorized.load(Ordering::SeqCst) {
        Json(json!({ "accessToken": "existing-token" }))
    } else {
        Json(json!({
            "authUrl": "https://auth.example/authorize",
            "state": "nonce-1"
        }))
    }
}

async fn auth_status(
    State(state): State<Arc<MockState>>,
    Query(_params): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    let call = state.status_calls.fetch_add(1, Ordering::SeqCst);
    if call < state.status_pending_polls.load(Ordering::SeqCst) {
        Json(json!({ "authenticated": false }))
    } else {
        Json(json!({ "authenticated": true, "accessToken": "polled-token" }))
    }
}

async fn auth_callback() -> Json<Value> {
    Json(json!({ "accessToken": "cb-token" }))
}
