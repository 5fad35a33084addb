//! ---
//! scs_section: "02-messaging-ipc-data-model"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Event model and publish/subscribe bus."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, trace};

use crate::event::{Event, EventKind};
use crate::Result;

/// Callback invoked for every event published on a subscribed topic.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe abstraction used by all event producers and consumers.
pub trait EventBus: Send + Sync {
    /// Register a handler for a topic.
    fn subscribe(&self, topic: &str, handler: EventHandler) -> SubscriptionId;
    /// Remove a handler. Returns false when the id was unknown.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
    /// Deliver an event to the topic's subscribers, returning how many were called.
    fn publish(&self, event: Event) -> Result<usize>;

    /// Build and publish an event from its parts.
    fn send_event(
        &self,
        topic: &str,
        kind: EventKind,
        id: &str,
        fields: Map<String, JsonValue>,
    ) -> Result<usize> {
        let mut event = Event::new(topic, kind, id);
        event.fields = fields;
        self.publish(event)
    }
}

const DEFAULT_HISTORY: usize = 256;

/// In-process bus delivering events synchronously on the publisher's thread.
///
/// Handlers run outside the subscription lock, so a handler may itself
/// subscribe or publish. A bounded history of published events is retained
/// for inspection.
pub struct InMemoryEventBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    history: Mutex<VecDeque<Event>>,
    history_limit: usize,
}

impl InMemoryEventBus {
    /// Create a bus retaining the default history length.
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Create a bus retaining at most `limit` past events.
    pub fn with_history(limit: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(limit.min(DEFAULT_HISTORY))),
            history_limit: limit,
        }
    }

    /// Snapshot of retained events, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.history.lock().iter().cloned().collect()
    }

    /// Number of handlers registered for a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.read().get(topic).map_or(0, Vec::len)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("topics", &self.subscribers.read().len())
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl EventBus for InMemoryEventBus {
    fn subscribe(&self, topic: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(topic.to_owned())
            .or_default()
            .push((id, handler));
        debug!(topic, subscription = id.0, "subscribed");
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        for handlers in subscribers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(sub, _)| *sub == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    fn publish(&self, event: Event) -> Result<usize> {
        let handlers: Vec<EventHandler> = self
            .subscribers
            .read()
            .get(&event.topic)
            .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(topic = %event.topic, kind = ?event.kind, id = %event.id, handlers = handlers.len(), "publishing event");
        for handler in &handlers {
            handler(&event);
        }

        if self.history_limit > 0 {
            let mut history = self.history.lock();
            if history.len() == self.history_limit {
                history.pop_front();
            }
            history.push_back(event);
        }
        Ok(handlers.len())
    }
}
