//! ---
//! scs_section: "02-messaging-ipc-data-model"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Event model and publish/subscribe bus."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Topic carrying lifecycle notifications (ready, reboot, shutdown).
pub const SYSTEM_TOPIC: &str = "system";

/// Change classification carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A resource appeared or an action was announced.
    Added,
    /// An existing resource changed.
    Changed,
    /// A resource went away.
    Removed,
}

/// Named event delivered to topic subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for deduplication and tracing.
    pub uuid: Uuid,
    /// Topic the event was published on, e.g. `system`.
    pub topic: String,
    /// Change classification.
    pub kind: EventKind,
    /// Identifier of the subject within the topic, e.g. `ready`.
    pub id: String,
    /// Free-form attributes.
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
    /// Timestamp when the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Construct an event with no extra fields.
    pub fn new(topic: impl Into<String>, kind: EventKind, id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            topic: topic.into(),
            kind,
            id: id.into(),
            fields: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a single field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Whether this event is `topic`/`id`.
    pub fn is(&self, topic: &str, id: &str) -> bool {
        self.topic == topic && self.id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_kind_in_upper_case() {
        let event = Event::new(SYSTEM_TOPIC, EventKind::Added, "reboot")
            .with_field("description", "System is going to reboot");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], json!("ADDED"));
        assert_eq!(value["fields"]["description"], json!("System is going to reboot"));
        assert!(event.is("system", "reboot"));
        assert!(!event.is("system", "ready"));
    }
}
