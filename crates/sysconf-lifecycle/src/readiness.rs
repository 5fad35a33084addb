//! ---
//! scs_section: "07-lifecycle-control"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "One-way boot readiness flag driven by system events."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sysconf_msg::{Event, EventBus, SubscriptionId, SYSTEM_TOPIC};
use tracing::info;

/// Event id on the `system` topic that marks boot completion.
pub const READY_EVENT_ID: &str = "ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadinessState {
    #[default]
    NotReady,
    Ready { since: DateTime<Utc> },
}

/// Whether the system finished booting. Starts not ready and never goes back.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ReadinessFlag {
    state: Arc<RwLock<ReadinessState>>,
}

impl ReadinessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), ReadinessState::Ready { .. })
    }

    pub fn state(&self) -> ReadinessState {
        *self.state.read()
    }

    pub fn ready_since(&self) -> Option<DateTime<Utc>> {
        match *self.state.read() {
            ReadinessState::Ready { since } => Some(since),
            ReadinessState::NotReady => None,
        }
    }

    /// Apply an event. Returns true only for the call that flipped the flag.
    pub fn handle_event(&self, event: &Event) -> bool {
        if !event.is(SYSTEM_TOPIC, READY_EVENT_ID) {
            return false;
        }
        self.mark_ready()
    }

    fn mark_ready(&self) -> bool {
        let mut state = self.state.write();
        if matches!(*state, ReadinessState::Ready { .. }) {
            return false;
        }
        let since = Utc::now();
        *state = ReadinessState::Ready { since };
        info!(%since, "system is ready");
        true
    }

    /// Subscribe to the `system` topic on `bus`.
    pub fn attach(&self, bus: &dyn EventBus) -> SubscriptionId {
        let flag = self.clone();
        bus.subscribe(
            SYSTEM_TOPIC,
            Arc::new(move |event: &Event| {
                flag.handle_event(event);
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysconf_msg::{EventKind, InMemoryEventBus};

    #[test]
    fn only_system_ready_flips_the_flag() {
        let flag = ReadinessFlag::new();
        assert!(!flag.is_ready());
        assert!(!flag.handle_event(&Event::new(SYSTEM_TOPIC, EventKind::Added, "reboot")));
        assert!(!flag.handle_event(&Event::new("pool", EventKind::Added, "ready")));
        assert!(!flag.is_ready());
        assert_eq!(flag.ready_since(), None);

        assert!(flag.handle_event(&Event::new(SYSTEM_TOPIC, EventKind::Added, "ready")));
        assert!(flag.is_ready());
        let since = flag.ready_since().unwrap();

        assert!(!flag.handle_event(&Event::new(SYSTEM_TOPIC, EventKind::Changed, "ready")));
        assert_eq!(flag.ready_since(), Some(since));
    }

    #[test]
    fn attached_flag_follows_the_bus() {
        let bus = InMemoryEventBus::new();
        let flag = ReadinessFlag::new();
        let observer = flag.clone();
        flag.attach(&bus);

        bus.publish(Event::new(SYSTEM_TOPIC, EventKind::Added, "shutdown")).unwrap();
        assert!(!observer.is_ready());
        bus.publish(Event::new(SYSTEM_TOPIC, EventKind::Added, READY_EVENT_ID)).unwrap();
        assert!(observer.is_ready());
        assert!(matches!(observer.state(), ReadinessState::Ready { .. }));
    }

    #[test]
    fn state_serialises_with_tag() {
        let value = serde_json::to_value(ReadinessState::NotReady).unwrap();
        assert_eq!(value, serde_json::json!({"state": "not_ready"}));
    }
}
