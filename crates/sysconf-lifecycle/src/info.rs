//! ---
//! scs_section: "07-lifecycle-control"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Read-only host telemetry."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysconf_common::VersionInfo;
use tokio::process::Command;
use tracing::debug;

use crate::readiness::ReadinessFlag;

/// Host facts collected by a [`TelemetrySource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub hostname: String,
    pub cores: usize,
    pub loadavg: [f64; 3],
    pub uptime_seconds: f64,
    pub system_serial: Option<String>,
    pub system_product: Option<String>,
    pub system_manufacturer: Option<String>,
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Collect a snapshot. Individual probes that fail are left at their defaults.
    async fn snapshot(&self) -> HostSnapshot;
}

/// Reads `/proc` and asks `dmidecode` for hardware identity.
#[derive(Debug, Clone)]
pub struct ProcTelemetrySource {
    proc_root: PathBuf,
    dmidecode: PathBuf,
    timeout: Duration,
}

impl ProcTelemetrySource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            dmidecode: PathBuf::from("dmidecode"),
            timeout,
        }
    }

    /// Read procfs from another root, for tests and containers.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn with_dmidecode(mut self, program: impl Into<PathBuf>) -> Self {
        self.dmidecode = program.into();
        self
    }

    async fn read_proc(&self, rel: &str) -> Option<String> {
        let path = self.proc_root.join(rel);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "procfs read failed");
                None
            }
        }
    }

    async fn dmi(&self, keyword: &str) -> Option<String> {
        let mut command = Command::new(&self.dmidecode);
        command.args(["-s", keyword]).kill_on_drop(true);
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                non_empty(String::from_utf8_lossy(&output.stdout).trim())
            }
            Ok(Ok(output)) => {
                debug!(keyword, status = %output.status, "dmidecode failed");
                None
            }
            Ok(Err(err)) => {
                debug!(keyword, error = %err, "dmidecode unavailable");
                None
            }
            Err(_) => {
                debug!(keyword, timeout = ?self.timeout, "dmidecode timed out");
                None
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for ProcTelemetrySource {
    async fn snapshot(&self) -> HostSnapshot {
        let hostname = self
            .read_proc("sys/kernel/hostname")
            .await
            .map(|h| h.trim().to_owned())
            .unwrap_or_default();
        let uptime_seconds = self
            .read_proc("uptime")
            .await
            .and_then(|text| parse_uptime(&text))
            .unwrap_or_default();
        let loadavg = self
            .read_proc("loadavg")
            .await
            .and_then(|text| parse_loadavg(&text))
            .unwrap_or_default();
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());

        HostSnapshot {
            hostname,
            cores,
            loadavg,
            uptime_seconds,
            system_serial: self.dmi("system-serial-number").await,
            system_product: self.dmi("system-product-name").await,
            system_manufacturer: self.dmi("system-manufacturer").await,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

/// First field of `/proc/uptime`.
pub fn parse_uptime(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// First three fields of `/proc/loadavg`.
pub fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut fields = text.split_whitespace().map(str::parse::<f64>);
    Some([
        fields.next()?.ok()?,
        fields.next()?.ok()?,
        fields.next()?.ok()?,
    ])
}

/// Telemetry returned by the `system info` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub version: String,
    pub hostname: String,
    pub cores: usize,
    pub loadavg: [f64; 3],
    pub uptime_seconds: f64,
    pub boottime: DateTime<Utc>,
    pub datetime: DateTime<Utc>,
    pub system_serial: Option<String>,
    pub system_product: Option<String>,
    pub system_manufacturer: Option<String>,
    pub timezone: String,
    pub ready: bool,
}

/// Combines a telemetry source with version and readiness.
#[derive(Clone)]
pub struct SystemTelemetry {
    source: Arc<dyn TelemetrySource>,
    readiness: ReadinessFlag,
    version: VersionInfo,
}

impl SystemTelemetry {
    pub fn new(source: Arc<dyn TelemetrySource>, readiness: ReadinessFlag) -> Self {
        Self {
            source,
            readiness,
            version: VersionInfo::current(),
        }
    }

    pub fn version(&self) -> String {
        self.version.sw_version()
    }

    /// Gather telemetry; `timezone` is the configured zone from the settings record.
    pub async fn info(&self, timezone: impl Into<String>) -> SystemInfo {
        let host = self.source.snapshot().await;
        let datetime = Utc::now();
        let uptime_ms = (host.uptime_seconds * 1000.0) as i64;
        SystemInfo {
            version: self.version(),
            hostname: host.hostname,
            cores: host.cores,
            loadavg: host.loadavg,
            uptime_seconds: host.uptime_seconds,
            boottime: datetime - chrono::Duration::milliseconds(uptime_ms),
            datetime,
            system_serial: host.system_serial,
            system_product: host.system_product,
            system_manufacturer: host.system_manufacturer,
            timezone: timezone.into(),
            ready: self.readiness.is_ready(),
        }
    }
}

impl std::fmt::Debug for SystemTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemTelemetry")
            .field("version", &self.version)
            .field("ready", &self.readiness.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proc_files() {
        assert_eq!(parse_uptime("12345.67 54321.00\n"), Some(12345.67));
        assert_eq!(parse_uptime(""), None);
        assert_eq!(
            parse_loadavg("0.52 0.58 0.59 1/977 12345\n"),
            Some([0.52, 0.58, 0.59])
        );
        assert_eq!(parse_loadavg("0.52 x 0.59"), None);
        assert_eq!(parse_loadavg("0.52"), None);
    }

    #[tokio::test]
    async fn snapshot_reads_fake_procfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/kernel")).unwrap();
        std::fs::write(dir.path().join("sys/kernel/hostname"), "nas01\n").unwrap();
        std::fs::write(dir.path().join("uptime"), "3600.00 7000.00\n").unwrap();
        std::fs::write(dir.path().join("loadavg"), "1.00 0.50 0.25 1/100 42\n").unwrap();

        let source = ProcTelemetrySource::new(Duration::from_millis(500))
            .with_proc_root(dir.path())
            .with_dmidecode("/nonexistent/dmidecode");
        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.hostname, "nas01");
        assert_eq!(snapshot.uptime_seconds, 3600.0);
        assert_eq!(snapshot.loadavg, [1.0, 0.5, 0.25]);
        assert!(snapshot.cores >= 1);
        assert_eq!(snapshot.system_serial, None);
    }

    struct Fixed;

    #[async_trait]
    impl TelemetrySource for Fixed {
        async fn snapshot(&self) -> HostSnapshot {
            HostSnapshot {
                hostname: "nas02".into(),
                cores: 4,
                uptime_seconds: 60.0,
                system_serial: Some("ABC123".into()),
                ..HostSnapshot::default()
            }
        }
    }

    #[tokio::test]
    async fn info_combines_source_readiness_and_timezone() {
        let readiness = ReadinessFlag::new();
        let telemetry = SystemTelemetry::new(Arc::new(Fixed), readiness.clone());
        let info = telemetry.info("Europe/Oslo").await;

        assert_eq!(info.hostname, "nas02");
        assert_eq!(info.timezone, "Europe/Oslo");
        assert!(!info.ready);
        assert!(info.version.starts_with("Sysconf-"));
        assert_eq!((info.datetime - info.boottime).num_seconds(), 60);
    }
}
