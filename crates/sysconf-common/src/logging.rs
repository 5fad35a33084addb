//! ---
//! scs_section: "01-core-functionality"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Tracing bootstrap for the Sysconf daemon and CLI."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "SYSCONF_LOG";

/// Directive used when neither `SYSCONF_LOG` nor `RUST_LOG` yields a valid filter.
/// Per-request spans from `tower_http` stay hidden unless a directive enables them.
pub const DEFAULT_DIRECTIVE: &str = "info,tower_http=warn";

/// Non-blocking writer guards; dropping them would lose buffered lines.
struct LogGuards {
    _file: WorkerGuard,
    _stdout: WorkerGuard,
}

static GUARDS: OnceCell<LogGuards> = OnceCell::new();

/// Output shape of the stdout layer. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Pick the filter from an explicit `SYSCONF_LOG` directive, then `RUST_LOG`,
/// then [`DEFAULT_DIRECTIVE`].
fn resolve_filter(custom: Option<String>) -> EnvFilter {
    if let Some(directive) = custom {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring invalid {LOG_ENV} directive {directive:?}: {err}"),
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber for `service_name`.
///
/// Settings, lifecycle and API events carry structured fields (`job`, `action`,
/// `certificate`, `address`); the JSON layers keep them as separate keys so the
/// daily file under [`LoggingConfig::directory`] can be filtered by job id.
/// Calling this twice is harmless: the second subscriber is discarded.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let file_name = format!(
        "{}.log",
        config.file_prefix.as_deref().unwrap_or(service_name)
    );

    let (file_writer, file_guard) = tracing_appender::non_blocking(daily(&config.directory, file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set(LogGuards {
        _file: file_guard,
        _stdout: stdout_guard,
    });

    let stdout_layer = {
        let layer = fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer);
        match config.format {
            LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
            LogFormat::Pretty => layer.with_target(true).boxed(),
        }
    };
    let file_layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .json()
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(resolve_filter(std::env::var(LOG_ENV).ok()))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        installed,
        "tracing initialised"
    );
    Ok(())
}
