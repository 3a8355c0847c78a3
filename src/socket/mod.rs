//! Real-time socket client with connection-state queuing
//!
//! Provides:
//! - a single shared transport per client, established lazily by `connect()`
//! - de-duplicated connection attempts (one handshake however many callers)
//! - three FIFO queues (emits, listener registrations, unregistrations)
//!   flushed together the moment the connection becomes live
//! - bounded reconnection with capped backoff after a transport drop
//! - listener registration handles instead of closure-identity comparison

mod frame;
mod listeners;
mod manager;
mod queue;

pub use frame::Frame;
pub use listeners::{EventHandler, ListenerHandle};
pub use manager::SocketClient;
