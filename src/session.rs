//! Session state and one-shot bootstrap
//!
//! The core cannot navigate the UI, so "redirect to login" is modelled as a
//! state transition on a watch channel the embedding layer observes. The
//! bootstrap half fetches the current user exactly once at app start when a
//! stored token pair exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::http::ApiClient;
use crate::types::Result;

/// Authenticated user document, opaque to the core beyond identity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Remaining server fields, preserved for the UI layer.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Startup: nothing known yet.
    #[default]
    Unknown,
    /// A current-user fetch succeeded.
    Authenticated(UserProfile),
    /// Terminal auth failure or explicit logout. The UI navigates to the
    /// login entry point when it observes this.
    LoggedOut,
}

/// Watch channel carrying [`SessionState`] transitions.
///
/// Publishing `LoggedOut` is idempotent: while the state is already
/// `LoggedOut` no further notification is sent.
#[derive(Clone)]
pub(crate) struct SessionEvents {
    tx: Arc<watch::Sender<SessionState>>,
}

impl SessionEvents {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Unknown);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn set_authenticated(&self, profile: UserProfile) {
        info!(user_id = %profile.id, "Session authenticated");
        let _ = self.tx.send(SessionState::Authenticated(profile));
    }

    pub(crate) fn set_logged_out(&self) {
        self.tx.send_if_modified(|state| {
            if matches!(state, SessionState::LoggedOut) {
                false
            } else {
                *state = SessionState::LoggedOut;
                true
            }
        });
    }
}

/// One-shot session bootstrap.
///
/// At app start the embedder calls [`Session::bootstrap`] once. If a token
/// pair is stored and no user is held and no fetch is already running, it
/// issues exactly one current-user request through the API client.
pub struct Session {
    client: Arc<ApiClient>,
    fetching: AtomicBool,
}

impl Session {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            fetching: AtomicBool::new(false),
        }
    }

    /// Run the bootstrap once.
    ///
    /// Returns `Ok(None)` when there is nothing to do: no stored tokens, a
    /// user already held, or a fetch already in progress. On success the
    /// profile is also published as [`SessionState::Authenticated`].
    pub async fn bootstrap(&self) -> Result<Option<UserProfile>> {
        if self.client.token_store().load().is_none() {
            debug!("Session bootstrap skipped: no stored tokens");
            return Ok(None);
        }
        if matches!(self.client.session_state(), SessionState::Authenticated(_)) {
            debug!("Session bootstrap skipped: user already held");
            return Ok(None);
        }
        if self.fetching.swap(true, Ordering::SeqCst) {
            debug!("Session bootstrap skipped: fetch already in progress");
            return Ok(None);
        }

        let result = self.fetch_current_user().await;
        self.fetching.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn fetch_current_user(&self) -> Result<UserProfile> {
        let path = self.client.config().me_path.clone();
        let profile: UserProfile = self.client.get(&path).await?;
        self.client.events().set_authenticated(profile.clone());
        Ok(profile)
    }
}
