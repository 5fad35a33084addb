//! ---
//! scs_section: "07-lifecycle-control"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Reboot and shutdown jobs."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
//! Reboot and shutdown as fire-and-forget jobs.
//!
//! Each job announces itself on the `system` topic, waits out its optional
//! delay on its own task and then calls the [`PowerPrimitive`]. Once the
//! delay has started there is no way to cancel the job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysconf_common::config::PowerConfig;
use sysconf_msg::{Event, EventBus, EventKind, SYSTEM_TOPIC};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{LifecycleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Reboot,
    Shutdown,
}

impl PowerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::Reboot => "reboot",
            PowerAction::Shutdown => "shutdown",
        }
    }

    /// Text carried in the announcement's `description` field.
    pub fn description(self) -> &'static str {
        match self {
            PowerAction::Reboot => "System is going to reboot",
            PowerAction::Shutdown => "System is going to shutdown",
        }
    }
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The irreversible host operations.
#[async_trait]
pub trait PowerPrimitive: Send + Sync {
    async fn reboot_now(&self) -> Result<()>;
    async fn halt_and_power_off(&self) -> Result<()>;
}

/// Runs the configured reboot/poweroff commands.
#[derive(Debug, Clone)]
pub struct SystemPowerPrimitive {
    reboot_command: Vec<String>,
    poweroff_command: Vec<String>,
    dry_run: bool,
}

impl SystemPowerPrimitive {
    pub fn new(reboot_command: Vec<String>, poweroff_command: Vec<String>, dry_run: bool) -> Self {
        Self {
            reboot_command,
            poweroff_command,
            dry_run,
        }
    }

    pub fn from_config(config: &PowerConfig) -> Self {
        Self::new(
            config.reboot_command.clone(),
            config.poweroff_command.clone(),
            config.dry_run,
        )
    }

    async fn run(&self, command: &[String]) -> Result<()> {
        let (program, args) = command.split_first().ok_or(LifecycleError::EmptyCommand)?;
        if self.dry_run {
            info!(%program, ?args, "dry run, not executing power command");
            return Ok(());
        }
        info!(%program, ?args, "executing power command");
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|source| LifecycleError::Spawn {
                command: program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(LifecycleError::CommandFailed {
                command: program.clone(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PowerPrimitive for SystemPowerPrimitive {
    async fn reboot_now(&self) -> Result<()> {
        self.run(&self.reboot_command).await
    }

    async fn halt_and_power_off(&self) -> Result<()> {
        self.run(&self.poweroff_command).await
    }
}

/// Receipt handed back when a job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub id: Uuid,
    pub action: PowerAction,
    /// Seconds to wait before the primitive runs.
    pub delay: Option<u64>,
    pub requested_at: DateTime<Utc>,
}

/// A running power job.
#[derive(Debug)]
pub struct PowerJob {
    pub ticket: JobTicket,
    pub handle: JoinHandle<Result<()>>,
}

/// Starts reboot and shutdown jobs.
#[derive(Clone)]
pub struct PowerJobs {
    bus: Arc<dyn EventBus>,
    primitive: Arc<dyn PowerPrimitive>,
}

impl PowerJobs {
    pub fn new(bus: Arc<dyn EventBus>, primitive: Arc<dyn PowerPrimitive>) -> Self {
        Self { bus, primitive }
    }

    pub fn reboot(&self, delay: Option<u64>) -> PowerJob {
        self.submit(PowerAction::Reboot, delay)
    }

    pub fn shutdown(&self, delay: Option<u64>) -> PowerJob {
        self.submit(PowerAction::Shutdown, delay)
    }

    /// Spawn the job on the current tokio runtime.
    pub fn submit(&self, action: PowerAction, delay: Option<u64>) -> PowerJob {
        let ticket = JobTicket {
            id: Uuid::new_v4(),
            action,
            delay,
            requested_at: Utc::now(),
        };
        info!(job = %ticket.id, %action, ?delay, "power job accepted");
        let handle = tokio::spawn(run_job(
            ticket.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.primitive),
        ));
        PowerJob { ticket, handle }
    }
}

impl std::fmt::Debug for PowerJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerJobs").finish_non_exhaustive()
    }
}

async fn run_job(
    ticket: JobTicket,
    bus: Arc<dyn EventBus>,
    primitive: Arc<dyn PowerPrimitive>,
) -> Result<()> {
    let action = ticket.action;
    let announcement = Event::new(SYSTEM_TOPIC, EventKind::Added, action.as_str())
        .with_field("description", action.description());
    if let Err(err) = bus.publish(announcement) {
        warn!(job = %ticket.id, %action, error = %err, "power job aborted before announcing");
        return Err(err.into());
    }

    if let Some(delay) = ticket.delay.filter(|secs| *secs > 0) {
        info!(job = %ticket.id, %action, delay, "waiting before power transition");
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }

    let outcome = match action {
        PowerAction::Reboot => primitive.reboot_now().await,
        PowerAction::Shutdown => primitive.halt_and_power_off().await,
    };
    if let Err(err) = &outcome {
        error!(job = %ticket.id, %action, error = %err, "power primitive failed");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_match_announcements() {
        assert_eq!(PowerAction::Reboot.description(), "System is going to reboot");
        assert_eq!(PowerAction::Shutdown.description(), "System is going to shutdown");
        assert_eq!(
            serde_json::to_value(PowerAction::Shutdown).unwrap(),
            serde_json::json!("shutdown")
        );
    }

    #[tokio::test]
    async fn dry_run_does_not_spawn() {
        let primitive = SystemPowerPrimitive::new(
            vec!["/nonexistent/reboot".into()],
            vec!["/nonexistent/poweroff".into()],
            true,
        );
        primitive.reboot_now().await.unwrap();
        primitive.halt_and_power_off().await.unwrap();
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let primitive = SystemPowerPrimitive::new(Vec::new(), Vec::new(), false);
        assert!(matches!(
            primitive.reboot_now().await,
            Err(LifecycleError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn missing_binary_reports_spawn_error() {
        let primitive = SystemPowerPrimitive::new(
            vec!["/nonexistent/sysconf-reboot".into()],
            Vec::new(),
            false,
        );
        assert!(matches!(
            primitive.reboot_now().await,
            Err(LifecycleError::Spawn { .. })
        ));
    }
}
