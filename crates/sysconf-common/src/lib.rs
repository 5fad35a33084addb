//! ---
//! scs_section: "01-core-functionality"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Shared primitives and utilities for the core runtime."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
//! Shared primitives for the Sysconf workspace: daemon configuration,
//! tracing bootstrap, and version metadata.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    ApiConfig, ChoicesConfig, DatastoreConfig, DatastoreKind, LoggingConfig, MetricsConfig,
    PowerConfig, ServiceConfig, TelemetryConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
