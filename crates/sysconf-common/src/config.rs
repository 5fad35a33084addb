//! ---
//! scs_section: "01-core-functionality"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Shared primitives and utilities for the core runtime."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 6000))
}

fn default_datastore_path() -> PathBuf {
    PathBuf::from("target/sysconf/datastore.json")
}

fn default_zoneinfo_root() -> PathBuf {
    PathBuf::from("/usr/share/zoneinfo/")
}

fn default_keymap_index() -> PathBuf {
    PathBuf::from("/usr/share/vt/keymaps/INDEX.keymaps")
}

fn default_reboot_command() -> Vec<String> {
    vec!["/sbin/reboot".to_owned()]
}

fn default_poweroff_command() -> Vec<String> {
    vec!["/sbin/poweroff".to_owned()]
}

fn default_subprocess_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object for the Sysconf daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub choices: ChoicesConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`ServiceConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedServiceConfig {
    pub config: ServiceConfig,
    pub source: Option<PathBuf>,
}

impl ServiceConfig {
    pub const ENV_CONFIG_PATH: &'static str = "SYSCONF_CONFIG";

    /// Load configuration from disk, respecting the `SYSCONF_CONFIG` override.
    /// Falls back to the built-in defaults when no candidate exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedServiceConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedServiceConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedServiceConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedServiceConfig {
            config: Self::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = contents
            .parse::<ServiceConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.datastore.validate()?;
        self.power.validate()?;
        if self.choices.zoneinfo_root.as_os_str().is_empty() {
            return Err(anyhow!("choices.zoneinfo_root may not be empty"));
        }
        Ok(())
    }
}

impl std::str::FromStr for ServiceConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: ServiceConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Backend used for the settings and certificate tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreKind {
    Memory,
    #[default]
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default)]
    pub kind: DatastoreKind,
    #[serde(default = "default_datastore_path")]
    pub path: PathBuf,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            kind: DatastoreKind::default(),
            path: default_datastore_path(),
        }
    }
}

impl DatastoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == DatastoreKind::Json && self.path.as_os_str().is_empty() {
            return Err(anyhow!("datastore.path is required for the json datastore"));
        }
        Ok(())
    }
}

/// Locations of the external sources backing the choice caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoicesConfig {
    #[serde(default = "default_zoneinfo_root")]
    pub zoneinfo_root: PathBuf,
    #[serde(default = "default_keymap_index")]
    pub keymap_index: PathBuf,
}

impl Default for ChoicesConfig {
    fn default() -> Self {
        Self {
            zoneinfo_root: default_zoneinfo_root(),
            keymap_index: default_keymap_index(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,
    #[serde(default = "default_poweroff_command")]
    pub poweroff_command: Vec<String>,
    /// Log the power action instead of executing it.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            reboot_command: default_reboot_command(),
            poweroff_command: default_poweroff_command(),
            dry_run: false,
        }
    }
}

impl PowerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reboot_command.is_empty() {
            return Err(anyhow!("power.reboot_command must name a program"));
        }
        if self.poweroff_command.is_empty() {
            return Err(anyhow!("power.poweroff_command must name a program"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_subprocess_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub subprocess_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            subprocess_timeout: default_subprocess_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}
