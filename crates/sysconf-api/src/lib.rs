//! ---
//! scs_section: "05-networking-external-interfaces"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "HTTP adapter for the system configuration service."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
mod handlers;
pub mod metrics;
mod server;

pub use handlers::{ApiState, PowerRequest};
pub use metrics::ServiceMetrics;
pub use server::{router, ApiServerBuilder, ApiServerHandle};
