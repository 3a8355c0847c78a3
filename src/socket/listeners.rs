//! Listener registry with explicit registration handles
//!
//! Registration returns a [`ListenerHandle`] used for removal, rather than
//! relying on closure identity. The one identity check kept is duplicate
//! suppression: registering the same `Arc`'d handler twice for one event is
//! a no-op that returns the original handle (`Arc::ptr_eq` is well-defined
//! where function-name comparison is not).

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Callback invoked with the `data` payload of each matching frame.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// Opaque removal token returned by `on()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Event name -> registered handlers. Registrations live client-side and
/// survive transport reconnects; dispatch is local.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: DashMap<String, Vec<(ListenerHandle, EventHandler)>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a pre-allocated handle.
    ///
    /// Returns the handle actually in effect: the given one, or the existing
    /// handle when this exact handler is already registered for the event.
    pub(crate) fn add(
        &self,
        event: &str,
        handle: ListenerHandle,
        handler: EventHandler,
    ) -> ListenerHandle {
        let mut entry = self.listeners.entry(event.to_string()).or_default();
        if let Some((existing, _)) = entry
            .iter()
            .find(|(_, registered)| Arc::ptr_eq(registered, &handler))
        {
            debug!(%event, "Duplicate listener suppressed");
            return *existing;
        }
        entry.push((handle, handler));
        handle
    }

    /// Remove one listener by handle. Returns whether anything was removed.
    pub(crate) fn remove_handle(&self, handle: ListenerHandle) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(h, _)| *h != handle);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Remove every listener for an event.
    pub(crate) fn remove_event(&self, event: &str) {
        self.listeners.remove(event);
    }

    /// Invoke every handler registered for the event.
    pub(crate) fn dispatch(&self, event: &str, data: &Value) {
        // Clone handlers out so user callbacks run without the shard lock.
        let handlers: Vec<EventHandler> = match self.listeners.get(event) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        for handler in handlers {
            handler(data.clone());
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|e| e.len()).unwrap_or(0)
    }
}
