//! Configuration for the Easel client core
//!
//! Plain config structs with defaults. The core is a library layer inside a
//! larger application, so configuration arrives from the embedder rather than
//! from CLI arguments or environment variables.

use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the marketplace API (e.g. "https://api.easel.art/v1")
    pub base_url: String,
    /// Path of the token refresh endpoint, relative to `base_url`
    pub refresh_path: String,
    /// Path of the current-user endpoint, relative to `base_url`
    pub me_path: String,
    /// Hard timeout applied to every request, the refresh call included
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            refresh_path: "/auth/refresh-tokens".to_string(),
            me_path: "/auth/me".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            ..Self::default()
        }
    }

    /// Absolute URL for a request path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}{}", self.base_url, ensure_leading_slash(path))
    }

    /// Absolute URL of the refresh endpoint.
    pub fn refresh_url(&self) -> String {
        self.url(&self.refresh_path)
    }
}

/// Socket client configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Base WebSocket URL (e.g. "wss://rt.easel.art")
    pub socket_url: String,
    /// Optional namespace suffix appended to the socket URL (e.g. "/chat")
    pub namespace: Option<String>,
    /// Timeout for the initial handshake
    pub connect_timeout: Duration,
    /// Whether to reconnect after a transport drop
    pub reconnection: bool,
    /// Maximum reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Initial delay between reconnection attempts
    pub reconnect_delay: Duration,
    /// Ceiling for the backed-off reconnection delay
    pub max_reconnect_delay: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://localhost:8081".to_string(),
            namespace: None,
            connect_timeout: Duration::from_secs(15),
            reconnection: true,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(10),
        }
    }
}

impl SocketConfig {
    /// Create a configuration for the given socket URL.
    pub fn new(socket_url: impl Into<String>) -> Self {
        Self {
            socket_url: trim_trailing_slash(socket_url.into()),
            ..Self::default()
        }
    }

    /// Set the namespace suffix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let ns = namespace.into();
        self.namespace = Some(ensure_leading_slash(&ns).into_owned());
        self
    }

    /// Full connection URL for a scope identifier.
    pub fn connect_url(&self, scope_id: &str) -> String {
        let ns = self.namespace.as_deref().unwrap_or("");
        format!("{}{}?scope={}", self.socket_url, ns, scope_id)
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

fn ensure_leading_slash(path: &str) -> std::borrow::Cow<'_, str> {
    if path.starts_with('/') {
        std::borrow::Cow::Borrowed(path)
    } else {
        std::borrow::Cow::Owned(format!("/{}", path))
    }
}
