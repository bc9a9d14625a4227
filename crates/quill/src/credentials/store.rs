//! Persistent per-platform credentials.
//!
//! One OAuth token per platform plus the currently-active session id, stored
//! as a small JSON file under the config directory. Survives restarts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::share::models::Platform;

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Errors from credential persistence.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    /// One token per platform, keyed by the stable platform name.
    #[serde(default)]
    tokens: HashMap<Platform, String>,
    /// Session to restore on next startup.
    #[serde(default)]
    active_session: Option<String>,
}

/// Store for per-platform OAuth tokens.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl CredentialStore {
    /// Open the store at `path`, creating empty state when the file does not
    /// exist. A corrupt file is an error; silently discarding tokens would
    /// force every platform through re-authorization.
    pub fn open(path: impl Into<PathBuf>) -> CredentialResult<Self> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Lock the in-memory state, recovering from poisoning. Every mutation
    /// persists before the guard releases, so a poisoned lock still holds
    /// consistent state.
    fn locked(&self) -> MutexGuard<'_, PersistedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The stored token for a platform, if authenticated.
    pub fn token(&self, platform: Platform) -> Option<String> {
        self.locked().tokens.get(&platform).cloned()
    }

    /// Store a token and persist immediately.
    pub fn set_token(&self, platform: Platform, token: &str) -> CredentialResult<()> {
        let mut state = self.locked();
        state.tokens.insert(platform, token.to_string());
        debug!("stored credential for {platform}");
        self.persist(&state)
    }

    /// Drop a token (verification failure or explicit disconnect).
    pub fn clear_token(&self, platform: Platform) -> CredentialResult<()> {
        let mut state = self.locked();
        if state.tokens.remove(&platform).is_none() {
            return Ok(());
        }
        debug!("cleared credential for {platform}");
        self.persist(&state)
    }

    /// The session id to restore on startup.
    pub fn active_session(&self) -> Option<String> {
        self.locked().active_session.clone()
    }

    /// Remember the active session across restarts.
    pub fn set_active_session(&self, session_id: Option<&str>) -> CredentialResult<()> {
        let mut state = self.locked();
        state.active_session = session_id.map(str::to_string);
        self.persist(&state)
    }

    fn persist(&self, state: &PersistedState) -> CredentialResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
