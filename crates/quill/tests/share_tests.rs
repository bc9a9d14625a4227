//! Share pipeline integration tests against the mock backend.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use quill::share::models::Platform;
use quill::{ClientConfig, ClientEvent, QuillClient};

mod common;
use common::{MockState, StreamScript, spawn_backend};

async fn client_with_answer(
    state: Arc<MockState>,
    dir: &std::path::Path,
) -> (QuillClient, String) {
    let base_url = spawn_backend(state).await;
    let config = ClientConfig {
        base_url,
        request_timeout_secs: 5,
        credentials_file: Some(dir.join("credentials.json").display().to_string()),
        downloads_dir: Some(dir.join("downloads").display().to_string()),
        ..Default::default()
    };
    let client = QuillClient::new(config).unwrap();
    client.conversation.send("Q1", Vec::new()).await.unwrap();
    let answer_id = client.conversation.messages().await[1].id.clone();
    (client, answer_id)
}

#[tokio::test]
async fn test_open_share_toggle_and_cache() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(Arc::clone(&state), dir.path()).await;

    // First open fetches and caches the preview.
    client.share.open_share(&answer_id, Platform::Twitter).await;
    let session = client.share.active().await.unwrap();
    assert_eq!(session.platform, Platform::Twitter);
    assert!(!session.loading);
    assert_eq!(
        session.preview.unwrap().content.joined(),
        "[twitter] an answer"
    );
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 1);

    // Second call toggles closed: no session, no network.
    client.share.open_share(&answer_id, Platform::Twitter).await;
    assert!(client.share.active().await.is_none());
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 1);

    // Third call reopens from cache: still one network call total.
    client.share.open_share(&answer_id, Platform::Twitter).await;
    let reopened = client.share.active().await.unwrap();
    assert!(reopened.preview.is_some());
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_change_platform_fetches_only_new_platform() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(Arc::clone(&state), dir.path()).await;

    client.share.open_share(&answer_id, Platform::Twitter).await;
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 1);

    client
        .share
        .change_platform(&answer_id, Platform::Linkedin)
        .await;
    let session = client.share.active().await.unwrap();
    assert_eq!(session.platform, Platform::Linkedin);
    assert_eq!(
        session.preview.unwrap().content.joined(),
        "[linkedin] an answer"
    );
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 2);

    // Back to a cached platform: no further fetch.
    client
        .share
        .change_platform(&answer_id, Platform::Twitter)
        .await;
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.share.cached_previews(), 2);
}

#[tokio::test]
async fn test_ensure_preview_is_idempotent_per_key() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(Arc::clone(&state), dir.path()).await;

    let first = client
        .share
        .ensure_preview(&answer_id, Platform::Reddit)
        .await
        .unwrap();
    let second = client
        .share
        .ensure_preview(&answer_id, Platform::Reddit)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(state.format_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_post_without_credential_sets_actionable_error() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(state, dir.path()).await;

    client.share.open_share(&answer_id, Platform::Twitter).await;
    client.share.post_directly(&answer_id).await;

    let session = client.share.active().await.unwrap();
    let error = session.error.unwrap();
    assert!(error.to_lowercase().contains("connect"), "got: {error}");
    assert!(session.success.is_none());
}

#[tokio::test]
async fn test_post_with_credential_succeeds() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(state, dir.path()).await;

    client
        .credentials
        .set_token(Platform::Twitter, "good-token")
        .unwrap();
    client.share.open_share(&answer_id, Platform::Twitter).await;
    client.share.post_directly(&answer_id).await;

    let session = client.share.active().await.unwrap();
    assert!(session.error.is_none());
    assert!(session.success.unwrap().contains("Posted to Twitter"));
}

#[tokio::test]
async fn test_rejected_token_cleared_and_error_verbatim() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(state, dir.path()).await;

    client
        .credentials
        .set_token(Platform::Twitter, "expired-token")
        .unwrap();
    client.share.open_share(&answer_id, Platform::Twitter).await;
    client.share.post_directly(&answer_id).await;

    let session = client.share.active().await.unwrap();
    assert!(session.error.unwrap().contains("token rejected by platform"));
    assert!(client.credentials.token(Platform::Twitter).is_none());
}

#[tokio::test]
async fn test_open_intent_publishes_share_url() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(Arc::clone(&state), dir.path()).await;

    client.share.open_share(&answer_id, Platform::Twitter).await;

    let mut rx = client.subscribe();
    client.share.open_intent(&answer_id).await;

    let url = loop {
        match rx.recv().await.unwrap() {
            ClientEvent::OpenUrl(url) => break url,
            _ => continue,
        }
    };
    assert!(url.starts_with("https://twitter.com/intent/tweet?"));
    assert!(url.contains(&urlencoding::encode("https://q.example/s/").into_owned()));
    assert_eq!(state.link_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generate_image_downloads_file() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(state, dir.path()).await;

    client.share.open_share(&answer_id, Platform::Twitter).await;

    let mut rx = client.subscribe();
    client.share.generate_image(&answer_id).await;

    let path = loop {
        match rx.recv().await.unwrap() {
            ClientEvent::DownloadReady(path) => break path,
            _ => continue,
        }
    };
    assert!(path.exists());
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn test_actions_without_preview_record_error() {
    let state = Arc::new(MockState::default());
    state.push_script(StreamScript::simple("an answer"));
    let dir = tempfile::tempdir().unwrap();
    let (client, answer_id) = client_with_answer(state, dir.path()).await;

    // Open a session whose preview never resolves by pointing at a message
    // that is not shareable.
    client.share.open_share("missing-id", Platform::Twitter).await;
    let session = client.share.active().await.unwrap();
    assert!(session.error.is_some());
    assert!(session.preview.is_none());

    client.share.post_directly("missing-id").await;
    let session = client.share.active().await.unwrap();
    assert!(session.error.is_some());
    let _ = answer_id;
}
