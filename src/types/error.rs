//! Error types for the Easel client core

use reqwest::StatusCode;

/// Main error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum EaselError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EaselError {
    /// Whether this error is the terminal auth failure that ends a session.
    pub fn is_auth_terminal(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Status code of the failing response, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// Implement From conversions for common error types

impl From<reqwest::Error> for EaselError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EaselError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for EaselError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, EaselError>;
