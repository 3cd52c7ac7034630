//! Lifecycle events emitted by store connections.
//!
//! Events are delivered to handlers registered through
//! [`KeyValueStore::on_event`](crate::traits::KeyValueStore::on_event).
//! Handlers only observe; nothing in RedisCache reacts to an event beyond
//! logging it.

pub mod store;

use std::sync::{Arc, RwLock};

pub use store::StoreEvent;

/// Callback invoked for every [`StoreEvent`].
pub type StoreEventHandler = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// A set of registered event handlers.
///
/// Store implementations embed one of these and call [`EventHandlers::emit`]
/// whenever their connection changes state.
#[derive(Default)]
pub struct EventHandlers {
    handlers: RwLock<Vec<StoreEventHandler>>,
}

impl EventHandlers {
    /// Create an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    pub fn register(&self, handler: StoreEventHandler) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(handler);
        }
    }

    /// Deliver an event to every registered handler.
    pub fn emit(&self, event: &StoreEvent) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("count", &self.len())
            .finish()
    }
}
