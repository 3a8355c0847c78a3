//! Easel client core - authenticated API and real-time access for the Easel
//! art marketplace
//!
//! Two subsystems with real state-machine concerns live here; everything
//! else in the application is presentational glue that calls into them:
//!
//! - **HTTP client** ([`ApiClient`]): bearer-token attachment plus a
//!   single-flight token refresh on 401. Concurrent expiries share one
//!   refresh call; requests arriving mid-refresh wait and replay once.
//! - **Socket client** ([`SocketClient`]): one shared transport, connect
//!   de-duplication, queues for operations issued before the connection
//!   exists, bounded reconnection with capped backoff.
//!
//! They are independent of each other and share only the [`token::TokenStore`]
//! as a read dependency. Session lifecycle (bootstrap, forced logout) is
//! surfaced through a watch channel the embedding UI observes.

pub mod config;
pub mod http;
pub mod logging;
pub mod session;
pub mod socket;
pub mod token;
pub mod types;

pub use config::{ClientConfig, SocketConfig};
pub use http::ApiClient;
pub use session::{Session, SessionState, UserProfile};
pub use socket::{EventHandler, Frame, ListenerHandle, SocketClient};
pub use token::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
pub use types::{EaselError, Result};
