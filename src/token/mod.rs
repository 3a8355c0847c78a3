//! Token storage for the Easel client core
//!
//! The access/refresh pair is always read and written together. This single
//! canonical store contract replaces per-platform cookie plumbing: the HTTP
//! client and the socket client both read from it, and only the HTTP client's
//! refresh cycle (or an explicit logout) writes to it.

mod store;

pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

use serde::{Deserialize, Serialize};

/// Access/refresh token pair.
///
/// Replaced wholesale on every successful refresh, deleted on logout or on a
/// terminal refresh failure. The pair is never split: sending a request with
/// an access token whose sibling refresh token has already been rotated is a
/// defined failure mode the wholesale replacement prevents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Bearer header value for the access token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}
