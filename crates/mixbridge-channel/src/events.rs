//! Typed event bus for host broadcast events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mixbridge_frame::Topic;
use serde_json::Value;

/// Callback invoked with the positional args of a broadcast frame.
pub type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    once: bool,
    handler: Handler,
}

/// Topic → listeners. Multiple independent listeners per topic are allowed.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<Topic, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent listener.
    pub fn on(&self, topic: Topic, handler: Handler) -> ListenerId {
        self.add(topic, handler, false)
    }

    /// Register a listener that is removed before its first invocation.
    pub fn once(&self, topic: Topic, handler: Handler) -> ListenerId {
        self.add(topic, handler, true)
    }

    pub fn remove(&self, topic: &Topic, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(list) = listeners.get_mut(topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|listener| listener.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(topic);
        }
        removed
    }

    /// Remove every listener on `topic`, returning how many there were.
    pub fn remove_all(&self, topic: &Topic) -> usize {
        self.lock().remove(topic).map_or(0, |list| list.len())
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.lock().get(topic).map_or(0, Vec::len)
    }

    /// Invoke every listener on `topic` in registration order.
    ///
    /// Handlers run after the table lock is released, so they may register or
    /// remove listeners themselves.
    pub fn emit(&self, topic: &Topic, args: &[Value]) -> usize {
        let handlers: Vec<Handler> = {
            let mut listeners = self.lock();
            let Some(list) = listeners.get_mut(topic) else {
                return 0;
            };
            let handlers = list
                .iter()
                .map(|listener| Arc::clone(&listener.handler))
                .collect();
            list.retain(|listener| !listener.once);
            if list.is_empty() {
                listeners.remove(topic);
            }
            handlers
        };

        for handler in &handlers {
            handler(args);
        }
        handlers.len()
    }

    fn add(&self, topic: Topic, handler: Handler, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(topic).or_default().push(Listener {
            id,
            once,
            handler,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, Vec<Listener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.lock().len();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}
