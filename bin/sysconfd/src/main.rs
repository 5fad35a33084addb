//! ---
//! scs_section: "01-core-functionality"
//! scs_subsection: "binary"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Binary entrypoint for the Sysconf daemon."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sysconf_api::metrics::prometheus::Registry;
use sysconf_api::{ApiServerBuilder, ApiServerHandle, ApiState, ServiceMetrics};
use sysconf_common::{init_tracing, DatastoreConfig, DatastoreKind, ServiceConfig, VersionInfo};
use sysconf_lifecycle::{
    PowerJobs, ProcTelemetrySource, ReadinessFlag, SystemPowerPrimitive, SystemTelemetry,
};
use sysconf_msg::{EventBus, EventKind, InMemoryEventBus, SYSTEM_TOPIC};
use sysconf_persistence::{Datastore, JsonFileDatastore, MemoryDatastore};
use sysconf_settings::{
    ChoiceCache, FilesystemChoiceSource, GeneralSettingsPatch, GeneralSettingsService,
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Sysconf system configuration daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the API and publish readiness (default)")]
    Run,
    #[command(about = "Load and validate the service configuration, then exit")]
    ValidateConfig,
    #[command(about = "Validate a JSON settings patch against the current store")]
    CheckPatch {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    #[command(about = "Print a choice list as JSON")]
    Choices {
        #[arg(value_enum)]
        kind: ChoiceKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChoiceKind {
    Timezones,
    Kbdmaps,
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/sysconfd.toml"));
    candidates.push(PathBuf::from("/etc/sysconf/sysconfd.toml"));

    let loaded = ServiceConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("sysconfd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running with defaults"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await?,
        Commands::ValidateConfig => {
            config.validate()?;
            println!("configuration OK");
        }
        Commands::CheckPatch { file } => check_patch(&config, &file)?,
        Commands::Choices { kind } => {
            let settings = settings_service(&config, None)?;
            let rendered = match kind {
                ChoiceKind::Timezones => serde_json::to_string_pretty(&*settings.timezone_choices())?,
                ChoiceKind::Kbdmaps => {
                    serde_json::to_string_pretty(&*settings.keyboard_map_choices())?
                }
                ChoiceKind::Languages => serde_json::to_string_pretty(&settings.language_choices())?,
            };
            println!("{rendered}");
        }
    }

    Ok(())
}

fn open_datastore(config: &DatastoreConfig) -> Result<Arc<dyn Datastore>> {
    Ok(match config.kind {
        DatastoreKind::Memory => Arc::new(MemoryDatastore::new()),
        DatastoreKind::Json => Arc::new(
            JsonFileDatastore::open(&config.path)
                .with_context(|| format!("failed to open datastore {}", config.path.display()))?,
        ),
    })
}

fn settings_service(
    config: &ServiceConfig,
    bus: Option<Arc<dyn EventBus>>,
) -> Result<GeneralSettingsService> {
    let datastore = open_datastore(&config.datastore)?;
    let source = FilesystemChoiceSource::new(
        config.choices.zoneinfo_root.clone(),
        config.choices.keymap_index.clone(),
    );
    let service = GeneralSettingsService::new(datastore, Arc::new(ChoiceCache::new(Arc::new(source))));
    Ok(match bus {
        Some(bus) => service.with_events(bus),
        None => service,
    })
}

fn check_patch(config: &ServiceConfig, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("unable to read patch {}", file.display()))?;
    let patch: GeneralSettingsPatch = serde_json::from_str(&raw)
        .with_context(|| format!("invalid settings patch {}", file.display()))?;
    let verrors = settings_service(config, None)?.check(&patch)?;
    if verrors.is_empty() {
        println!("patch OK");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&verrors)?);
    anyhow::bail!("patch rejected with {} error(s)", verrors.len())
}

async fn run_daemon(config: ServiceConfig) -> Result<()> {
    let version = VersionInfo::current();
    info!(version = %version.sw_version(), "starting sysconfd");

    let bus = Arc::new(InMemoryEventBus::new());
    let readiness = ReadinessFlag::new();
    readiness.attach(bus.as_ref());

    let events: Arc<dyn EventBus> = bus.clone();
    let settings = settings_service(&config, Some(Arc::clone(&events)))?;
    let effective = settings.current().context("failed to load general settings")?;
    info!(id = effective.id, timezone = %effective.timezone, "general settings loaded");

    let primitive = SystemPowerPrimitive::from_config(&config.power);
    if config.power.dry_run {
        warn!("power commands run in dry-run mode");
    }
    let power = PowerJobs::new(events, Arc::new(primitive));
    let telemetry = SystemTelemetry::new(
        Arc::new(ProcTelemetrySource::new(config.telemetry.subprocess_timeout)),
        readiness.clone(),
    );
    let metrics = if config.metrics.enabled {
        Some(ServiceMetrics::new(Arc::new(Registry::new()))?)
    } else {
        info!("metrics disabled by configuration");
        None
    };

    let mut api_server: Option<ApiServerHandle> = None;
    if config.api.enabled {
        let state = ApiState {
            settings: Arc::new(settings),
            readiness: readiness.clone(),
            power,
            telemetry,
            metrics,
        };
        match ApiServerBuilder::new(config.api.listen, state).spawn().await {
            Ok(server) => {
                info!(address = %server.local_addr(), "api server started");
                api_server = Some(server);
            }
            Err(err) => warn!(error = %err, "failed to start api server"),
        }
    } else {
        info!("api server disabled by configuration");
    }

    bus.send_event(SYSTEM_TOPIC, EventKind::Added, "ready", Default::default())?;
    info!(ready = readiness.is_ready(), "daemon running; waiting for termination signal");

    shutdown_signal().await;
    info!("termination signal received; shutting down");
    if let Some(server) = api_server {
        server.shutdown().await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
