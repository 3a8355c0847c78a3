//! Pending operation queues
//!
//! Operations issued while no live connection exists land in one of three
//! FIFO queues and are replayed together the moment the connection becomes
//! live. A flush takes the queues wholesale, so nothing is ever replayed a
//! second time on later reconnects.

use super::frame::Frame;
use super::listeners::{EventHandler, ListenerHandle};

/// A queued `off` call.
#[derive(Clone)]
pub(crate) enum Removal {
    /// Remove the listener created under this handle.
    Handle(ListenerHandle),
    /// Remove every listener for the event.
    Event(String),
}

/// The three queues of not-yet-deliverable operations.
#[derive(Default)]
pub(crate) struct PendingOps {
    pub registrations: Vec<(String, ListenerHandle, EventHandler)>,
    pub removals: Vec<Removal>,
    pub emits: Vec<Frame>,
}

impl PendingOps {
    /// Take everything queued, leaving the queues empty.
    pub(crate) fn take(&mut self) -> PendingOps {
        std::mem::take(self)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.removals.is_empty() && self.emits.is_empty()
    }
}
