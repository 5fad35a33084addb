//! ---
//! scs_section: "03-persistence-logging"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Persistence abstractions and storage bindings."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Record-oriented datastore consumed by the settings service.
//!
//! Records are flat JSON objects grouped into named tables and keyed by a
//! numeric `id` that the store assigns on insert.

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors encountered while reading/writing the store file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when the store file fails integrity verification.
    #[error("datastore hash mismatch")]
    HashMismatch,
    /// The store file was written by an incompatible envelope version.
    #[error("unsupported datastore version {0}")]
    UnsupportedVersion(u16),
    /// No row with the requested id exists in the table.
    #[error("record {id} not found in table '{table}'")]
    RecordNotFound {
        /// Table that was searched.
        table: String,
        /// Identifier that was requested.
        id: u64,
    },
}

pub mod datastore;
pub mod json_store;
pub mod memory;

pub use datastore::{strip_prefix, Datastore, Filter, Record, WriteOptions};
pub use json_store::{verify_store, JsonFileDatastore, STORE_VERSION};
pub use memory::{MemoryDatastore, Tables};
