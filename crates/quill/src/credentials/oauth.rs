//! OAuth authorization flow.
//!
//! Per-platform lifecycle: unauthenticated → pending (authorization page
//! open) → authenticated, falling back to unauthenticated on denial or
//! expiry. While the page is open, a cancellable task polls the auth-status
//! endpoint at a fixed interval up to a ceiling, stopping silently at the
//! ceiling. The popup's out-of-band callback is delivered through a
//! single-slot registration keyed by (platform, state nonce) so a stray or
//! replayed callback can never attach to the wrong flow.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::events::{ClientEvent, EventBus, NoticeLevel};
use crate::share::models::Platform;

use super::store::{CredentialError, CredentialStore};

/// Fixed delay between auth-status polls.
pub const AUTH_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Ceiling after which polling stops silently.
pub const AUTH_POLL_CEILING: Duration = Duration::from_secs(120);

/// Errors surfaced to the share UI when an authorization attempt fails.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("could not start authorization: {0}")]
    Initiate(String),

    #[error("authorization backend sent an incomplete response: {0}")]
    Protocol(&'static str),

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("callback did not match the pending authorization")]
    UnexpectedCallback,

    #[error(transparent)]
    Store(#[from] CredentialError),
}

/// The one authorization the client is currently waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingAuth {
    platform: Platform,
    state: String,
}

/// Drives the authorization popup flow for all platforms.
pub struct AuthFlow {
    api: Arc<ApiClient>,
    store: Arc<CredentialStore>,
    events: EventBus,
    /// Single-slot callback registration.
    pending: Arc<Mutex<Option<PendingAuth>>>,
    /// Cancellation handle of the running poll, if any.
    poll: Arc<Mutex<Option<CancellationToken>>>,
    poll_interval: Duration,
    poll_ceiling: Duration,
}

impl AuthFlow {
    pub fn new(api: Arc<ApiClient>, store: Arc<CredentialStore>, events: EventBus) -> Self {
        Self::with_poll_params(api, store, events, AUTH_POLL_INTERVAL, AUTH_POLL_CEILING)
    }

    /// Construct with custom poll timing. Tests shrink the interval to keep
    /// wall-clock time down.
    pub fn with_poll_params(
        api: Arc<ApiClient>,
        store: Arc<CredentialStore>,
        events: EventBus,
        poll_interval: Duration,
        poll_ceiling: Duration,
    ) -> Self {
        Self {
            api,
            store,
            events,
            pending: Arc::new(Mutex::new(None)),
            poll: Arc::new(Mutex::new(None)),
            poll_interval,
            poll_ceiling,
        }
    }

    /// Whether a platform currently has a stored credential.
    pub fn is_authenticated(&self, platform: Platform) -> bool {
        self.store.token(platform).is_some()
    }

    /// Start authorization for a platform.
    ///
    /// When the backend reports an existing grant the token is stored
    /// directly and no page opens. Otherwise the authorization URL is
    /// published for the frontend and the status poll starts.
    pub async fn initiate_auth(&self, platform: Platform) -> Result<(), AuthError> {
        let response = self
            .api
            .auth_initiate(platform)
            .await
            .map_err(|e| AuthError::Initiate(e.to_string()))?;

        if let Some(token) = response.access_token {
            self.store.set_token(platform, &token)?;
            info!("{platform} was already authorized, token stored");
            self.events.notice(
                NoticeLevel::Info,
                format!("{} account connected", platform.display_name()),
            );
            return Ok(());
        }

        let auth_url = response
            .auth_url
            .ok_or(AuthError::Protocol("neither token nor auth url"))?;
        let state = response
            .state
            .ok_or(AuthError::Protocol("auth url without state nonce"))?;

        {
            let mut pending = self.pending.lock().await;
            if let Some(previous) = pending.replace(PendingAuth {
                platform,
                state: state.clone(),
            }) {
                debug!("dropping stale pending auth for {}", previous.platform);
            }
        }
        self.events.emit(ClientEvent::OpenUrl(auth_url));
        self.spawn_poll(platform, state).await;
        Ok(())
    }

    /// Deliver the `(platform, code, state)` callback from the authorization
    /// page. Only the registered (platform, state) pair is accepted.
    pub async fn handle_callback(
        &self,
        platform: Platform,
        code: &str,
        state: &str,
    ) -> Result<(), AuthError> {
        {
            let pending = self.pending.lock().await;
            match pending.as_ref() {
                Some(p) if p.platform == platform && p.state == state => {}
                _ => {
                    warn!("ignoring auth callback with unknown platform/state");
                    return Err(AuthError::UnexpectedCallback);
                }
            }
        }

        let token = self
            .api
            .auth_callback(platform, code, state)
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        // Only a successful exchange consumes the registration; a transient
        // exchange failure leaves it in place for a retried callback.
        {
            let mut pending = self.pending.lock().await;
            if pending
                .as_ref()
                .is_some_and(|p| p.platform == platform && p.state == state)
            {
                pending.take();
            }
        }
        // The running poll sees this token on its next tick and stops.
        self.store.set_token(platform, &token.access_token)?;
        info!("{platform} authorized via callback");
        self.events.notice(
            NoticeLevel::Info,
            format!("{} account connected", platform.display_name()),
        );
        Ok(())
    }

    /// Cancel the running poll and forget the pending authorization. Called
    /// on view teardown.
    pub async fn cancel(&self) {
        if let Some(token) = self.poll.lock().await.take() {
            token.cancel();
        }
        self.pending.lock().await.take();
    }

    /// Spawn the status poll, replacing (and cancelling) any previous one.
    async fn spawn_poll(&self, platform: Platform, state: String) {
        let cancel = CancellationToken::new();
        {
            let mut poll = self.poll.lock().await;
            if let Some(previous) = poll.replace(cancel.clone()) {
                previous.cancel();
            }
        }

        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let pending = Arc::clone(&self.pending);
        let interval = self.poll_interval;
        let ceiling = self.poll_ceiling;

        tokio::spawn(async move {
            let ticks = (ceiling.as_millis() / interval.as_millis().max(1)).max(1) as u64;
            let mut timer = tokio::time::interval(interval);
            // The first interval tick fires immediately; consume it so the
            // first status check happens one interval after the page opens.
            timer.tick().await;

            for _ in 0..ticks {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("auth poll for {platform} cancelled");
                        return;
                    }
                    _ = timer.tick() => {}
                }

                // A callback may have completed the flow between ticks.
                if store.token(platform).is_some() {
                    debug!("auth poll for {platform} observed stored token");
                    break;
                }

                match api.auth_status(platform, &state).await {
                    Ok(status) if status.authenticated => {
                        if let Some(token) = status.access_token {
                            if let Err(e) = store.set_token(platform, &token) {
                                warn!("failed to persist polled token: {e}");
                            } else {
                                events.notice(
                                    NoticeLevel::Info,
                                    format!("{} account connected", platform.display_name()),
                                );
                            }
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => debug!("auth status poll failed, retrying: {e}"),
                }
            }

            // Success or ceiling: stop silently. Release this flow's
            // registration only if it is still the installed one; a newer
            // flow keeps its own.
            let mut pending = pending.lock().await;
            if pending
                .as_ref()
                .is_some_and(|p| p.platform == platform && p.state == state)
            {
                pending.take();
            }
        });
    }
}
