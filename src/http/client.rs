//! API client with silent token refresh
//!
//! One `reqwest::Client` per [`ApiClient`]; all verbs funnel through a single
//! send path so the 401 recovery protocol applies uniformly. The refresh
//! episode is guarded by an async mutex plus a pair-rotation check after
//! acquisition, so the single-flight guarantee is structural rather than
//! flag-based: however many concurrent requests expire together, exactly one
//! refresh call reaches the backend.

use std::sync::Arc;

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::session::{SessionEvents, SessionState};
use crate::token::{TokenPair, TokenStore};
use crate::types::{EaselError, Result};

/// Authenticated API client.
///
/// Explicitly constructed, one instance per process (or per test). Share it
/// with `Arc`; all methods take `&self`.
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    /// Serializes refresh episodes. Waiters queue on the mutex and re-check
    /// the stored pair after acquiring, so at most one of them actually
    /// calls the refresh endpoint per expiry.
    refresh_gate: Mutex<()>,
    events: SessionEvents,
}

impl ApiClient {
    /// Create a client over the given token store.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EaselError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            tokens,
            refresh_gate: Mutex::new(()),
            events: SessionEvents::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub(crate) fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Observe session transitions (authenticated / logged out).
    pub fn session_watch(&self) -> watch::Receiver<SessionState> {
        self.events.subscribe()
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.events.state()
    }

    /// Clear stored tokens and publish a logged-out transition.
    pub fn logout(&self) {
        info!("Logging out: clearing token pair");
        self.tokens.clear();
        self.events.set_logged_out();
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.request_value(Method::GET, path, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let value = self.request_value(Method::POST, path, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let value = self.request_value(Method::PUT, path, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.request_value(Method::DELETE, path, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a request and return the raw JSON body, running the full 401
    /// recovery protocol.
    pub async fn request_value(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = self.config.url(path);

        // Token absence never fails a send; the request goes out
        // unauthenticated and the server decides.
        let observed = self.tokens.load().map(|pair| pair.access_token);
        let bearer = observed.as_deref().map(|token| format!("Bearer {}", token));

        let response = self.send_once(&method, &url, body.as_ref(), bearer).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_body(response).await;
        }

        // A 401 from the refresh endpoint itself is terminal: the session is
        // over, there is nothing left to exchange.
        if url == self.config.refresh_url() {
            self.force_logout();
            return Err(EaselError::Unauthorized(
                "refresh endpoint rejected the session".into(),
            ));
        }

        debug!(%url, "Request returned 401, entering refresh flow");
        let access = self.refreshed_access_token(observed.as_deref()).await?;

        let replay = self
            .send_once(&method, &url, body.as_ref(), Some(format!("Bearer {}", access)))
            .await?;
        if replay.status() == StatusCode::UNAUTHORIZED {
            // Replay guard: a request never triggers a second refresh.
            warn!(%url, "Replay after refresh still unauthorized, giving up");
            return Err(api_error(replay).await);
        }
        read_body(replay).await
    }

    // =========================================================================
    // Refresh episode
    // =========================================================================

    /// Return an access token that post-dates the 401, refreshing if this
    /// caller wins the episode.
    ///
    /// `observed` is the access token the failing request carried (None when
    /// it went out unauthenticated). After acquiring the gate, a stored pair
    /// whose access token differs from `observed` means another caller
    /// already completed the episode; its result is reused without a second
    /// refresh call.
    async fn refreshed_access_token(&self, observed: Option<&str>) -> Result<String> {
        let _guard = self.refresh_gate.lock().await;

        let pair = match self.tokens.load() {
            Some(pair) => pair,
            None => {
                // No refresh token: unrecoverable. Also the state every
                // waiter finds after a losing episode cleared the store.
                self.force_logout();
                return Err(EaselError::Unauthorized(
                    "no refresh token available".into(),
                ));
            }
        };

        if observed != Some(pair.access_token.as_str()) {
            debug!("Refresh episode already settled by another request");
            return Ok(pair.access_token);
        }

        match self.call_refresh(&pair.refresh_token).await {
            Ok(new_pair) => {
                self.tokens.save(&new_pair);
                info!("Token pair rotated");
                Ok(new_pair.access_token)
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                self.force_logout();
                Err(e)
            }
        }
    }

    /// The single refresh HTTP call of an episode.
    async fn call_refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let response = self
            .http
            .post(self.config.refresh_url())
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EaselError::Unauthorized(format!(
                "token refresh failed with status {}",
                status
            )));
        }
        Ok(response.json().await?)
    }

    fn force_logout(&self) {
        self.tokens.clear();
        self.events.set_logged_out();
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        bearer: Option<String>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(bearer) = bearer {
            request = request.header(header::AUTHORIZATION, bearer);
        }
        Ok(request.send().await?)
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(api_error_with_status(status, response).await);
    }
    let text = response.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

async fn api_error(response: reqwest::Response) -> EaselError {
    let status = response.status();
    api_error_with_status(status, response).await
}

async fn api_error_with_status(status: StatusCode, response: reqwest::Response) -> EaselError {
    let body = response.text().await.unwrap_or_default();
    EaselError::Api { status, body }
}
