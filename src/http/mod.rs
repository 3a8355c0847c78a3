//! Authenticated HTTP client core
//!
//! Wraps outbound API calls with bearer-token attachment and a single-flight,
//! queued recovery from token expiry:
//! - every request reads the current access token from the token store
//! - a 401 starts (or joins) exactly one refresh episode
//! - requests that 401 while a refresh is in flight wait for its outcome and
//!   replay once with the new token
//! - terminal failures clear the token pair and publish a logged-out
//!   session transition

mod client;

pub use client::ApiClient;
