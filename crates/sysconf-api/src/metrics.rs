//! ---
//! scs_section: "05-networking-external-interfaces"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Prometheus counters for settings updates and power jobs."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

pub use prometheus;

/// Counters recorded by the HTTP adapter.
#[derive(Clone, Debug)]
pub struct ServiceMetrics {
    registry: Arc<Registry>,
    settings_updates: IntCounter,
    validation_failures: IntCounter,
    power_jobs: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new(registry: Arc<Registry>) -> prometheus::Result<Self> {
        let settings_updates = IntCounter::with_opts(Opts::new(
            "sysconf_settings_updates_total",
            "General settings updates that were persisted",
        ))?;
        registry.register(Box::new(settings_updates.clone()))?;

        let validation_failures = IntCounter::with_opts(Opts::new(
            "sysconf_settings_validation_failures_total",
            "General settings patches rejected by validation",
        ))?;
        registry.register(Box::new(validation_failures.clone()))?;

        let power_jobs = IntCounterVec::new(
            Opts::new("sysconf_power_jobs_total", "Accepted power jobs by action"),
            &["action"],
        )?;
        registry.register(Box::new(power_jobs.clone()))?;

        Ok(Self {
            registry,
            settings_updates,
            validation_failures,
            power_jobs,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn record_update(&self) {
        self.settings_updates.inc();
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.inc();
    }

    pub fn record_power_job(&self, action: &str) {
        self.power_jobs.with_label_values(&[action]).inc();
    }

    /// Text exposition of every registered family.
    pub fn render(&self) -> Response {
        let encoder = TextEncoder::new();
        match encoder.encode_to_string(&self.registry.gather()) {
            Ok(body) => (
                StatusCode::OK,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(prometheus::TEXT_FORMAT),
                )],
                body,
            )
                .into_response(),
            Err(err) => {
                error!(error = %err, "failed to encode metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exported() {
        let metrics = ServiceMetrics::new(Arc::new(Registry::new())).unwrap();
        metrics.record_update();
        metrics.record_power_job("reboot");
        metrics.record_power_job("reboot");

        let families = metrics.registry().gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_owned()).collect();
        assert!(names.contains(&"sysconf_settings_updates_total".to_owned()));
        assert!(names.contains(&"sysconf_power_jobs_total".to_owned()));

        let power = families
            .iter()
            .find(|f| f.get_name() == "sysconf_power_jobs_total")
            .unwrap();
        assert_eq!(power.get_metric()[0].get_counter().get_value(), 2.0);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Arc::new(Registry::new());
        ServiceMetrics::new(Arc::clone(&registry)).unwrap();
        assert!(ServiceMetrics::new(registry).is_err());
    }
}
