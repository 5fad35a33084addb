//! ---
//! scs_section: "07-lifecycle-control"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Readiness tracking, power-state jobs and host telemetry."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
pub mod info;
pub mod power;
pub mod readiness;

use std::process::ExitStatus;

use sysconf_msg::MessagingError;

pub type Result<T> = std::result::Result<T, LifecycleError>;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to publish lifecycle event: {0}")]
    Event(#[from] MessagingError),
    #[error("power command is empty")]
    EmptyCommand,
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },
}

pub use info::{HostSnapshot, ProcTelemetrySource, SystemInfo, SystemTelemetry, TelemetrySource};
pub use power::{
    JobTicket, PowerAction, PowerJob, PowerJobs, PowerPrimitive, SystemPowerPrimitive,
};
pub use readiness::{ReadinessFlag, ReadinessState, READY_EVENT_ID};
