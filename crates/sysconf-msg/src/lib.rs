//! ---
//! scs_section: "02-messaging-ipc-data-model"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Event model and publish/subscribe bus."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod bus;
pub mod event;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Errors raised by event bus implementations.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// The bus can no longer deliver events.
    #[error("event bus unavailable: {0}")]
    Unavailable(String),
    /// Wrapper for JSON serialization or deserialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use bus::{EventBus, EventHandler, InMemoryEventBus, SubscriptionId};
pub use event::{Event, EventKind, SYSTEM_TOPIC};
