//! ---
//! scs_section: "05-networking-external-interfaces"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Router assembly and server lifecycle for the HTTP adapter."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{self, ApiState};

/// Build the router over shared state.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/api/v1/system/general",
            get(handlers::get_general).put(handlers::put_general),
        )
        .route("/api/v1/system/general/timezones", get(handlers::get_timezones))
        .route("/api/v1/system/general/kbdmaps", get(handlers::get_kbdmaps))
        .route("/api/v1/system/general/languages", get(handlers::get_languages))
        .route("/api/v1/system/ready", get(handlers::get_ready))
        .route("/api/v1/system/info", get(handlers::get_info))
        .route("/api/v1/system/version", get(handlers::get_version))
        .route("/api/v1/system/reboot", post(handlers::post_reboot))
        .route("/api/v1/system/shutdown", post(handlers::post_shutdown))
        .route("/metrics", get(handlers::get_metrics))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and spawns the API server.
pub struct ApiServerBuilder {
    listen: SocketAddr,
    state: Arc<ApiState>,
}

impl ApiServerBuilder {
    pub fn new(listen: SocketAddr, state: ApiState) -> Self {
        Self {
            listen,
            state: Arc::new(state),
        }
    }

    pub async fn spawn(self) -> anyhow::Result<ApiServerHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let address = listener.local_addr()?;
        info!(%address, "api server listening");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router(self.state)).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "api server exited with error");
            }
        });

        Ok(ApiServerHandle {
            address,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Running server; dropping it leaves the server running.
pub struct ApiServerHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ApiServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(anyhow::Error::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use prometheus::Registry;
    use reqwest::Client;
    use serde_json::{json, Value};
    use sysconf_lifecycle::{
        HostSnapshot, PowerJobs, PowerPrimitive, ReadinessFlag, SystemTelemetry, TelemetrySource,
    };
    use sysconf_msg::{EventBus, EventKind, InMemoryEventBus, SYSTEM_TOPIC};
    use sysconf_persistence::MemoryDatastore;
    use sysconf_settings::{ChoiceCache, ChoiceSource, GeneralSettingsService};

    use crate::metrics::ServiceMetrics;

    struct Choices;

    impl ChoiceSource for Choices {
        fn scan_timezones(&self) -> Vec<String> {
            vec!["UTC".into(), "America/Los_Angeles".into()]
        }

        fn read_keymap_index(&self) -> io::Result<Vec<u8>> {
            Ok(b"us.kbd:en:United States of America\n".to_vec())
        }
    }

    struct NoopPower;

    #[async_trait]
    impl PowerPrimitive for NoopPower {
        async fn reboot_now(&self) -> sysconf_lifecycle::Result<()> {
            Ok(())
        }

        async fn halt_and_power_off(&self) -> sysconf_lifecycle::Result<()> {
            Ok(())
        }
    }

    struct Host;

    #[async_trait]
    impl TelemetrySource for Host {
        async fn snapshot(&self) -> HostSnapshot {
            HostSnapshot {
                hostname: "nas-test".into(),
                cores: 2,
                ..HostSnapshot::default()
            }
        }
    }

    fn state(bus: Arc<InMemoryEventBus>) -> ApiState {
        let choices = Arc::new(ChoiceCache::new(Arc::new(Choices)));
        let settings = GeneralSettingsService::new(Arc::new(MemoryDatastore::new()), choices)
            .with_events(bus.clone());
        let readiness = ReadinessFlag::new();
        readiness.attach(bus.as_ref());
        ApiState {
            settings: Arc::new(settings),
            readiness: readiness.clone(),
            power: PowerJobs::new(bus, Arc::new(NoopPower)),
            telemetry: SystemTelemetry::new(Arc::new(Host), readiness),
            metrics: Some(ServiceMetrics::new(Arc::new(Registry::new())).unwrap()),
        }
    }

    #[tokio::test]
    async fn settings_round_trip_over_http() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), state(bus))
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let base = format!("http://{}/api/v1/system", handle.local_addr());

        let current: Value = client
            .get(format!("{base}/general"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(current["timezone"], json!("America/Los_Angeles"));

        let rejected = client
            .put(format!("{base}/general"))
            .json(&json!({"guiprotocol": "https", "syslogserver": "log"}))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = rejected.json().await.unwrap();
        assert_eq!(
            body["errors"][0]["attribute"],
            json!("general_settings.guicertificate")
        );

        let unknown = client
            .put(format!("{base}/general"))
            .json(&json!({"hostname": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let updated: Value = client
            .put(format!("{base}/general"))
            .json(&json!({"guiprotocol": "http", "syslogserver": "log:514", "timezone": "UTC"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["timezone"], json!("UTC"));
        assert_eq!(updated["guiport"], json!(80));

        let zones: Vec<String> = client
            .get(format!("{base}/general/timezones"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(zones, ["America/Los_Angeles", "UTC"]);

        let metrics = client
            .get(format!("http://{}/metrics", handle.local_addr()))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(metrics.contains("sysconf_settings_updates_total 1"));
        assert!(metrics.contains("sysconf_settings_validation_failures_total 1"));

        drop(client);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn readiness_info_and_power_endpoints() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), state(bus.clone()))
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let base = format!("http://{}/api/v1/system", handle.local_addr());

        let ready: Value = client
            .get(format!("{base}/ready"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ready["ready"], json!(false));

        bus.send_event(SYSTEM_TOPIC, EventKind::Added, "ready", Default::default())
            .unwrap();
        let info: Value = client
            .get(format!("{base}/info"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["ready"], json!(true));
        assert_eq!(info["hostname"], json!("nas-test"));
        assert_eq!(info["timezone"], json!("America/Los_Angeles"));

        let version: String = client
            .get(format!("{base}/version"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(version.starts_with("Sysconf-"));

        let accepted = client
            .post(format!("{base}/reboot"))
            .json(&json!({"delay": 0}))
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::ACCEPTED);
        let ticket: Value = accepted.json().await.unwrap();
        assert_eq!(ticket["action"], json!("reboot"));

        let bare = client.post(format!("{base}/shutdown")).send().await.unwrap();
        assert_eq!(bare.status(), StatusCode::ACCEPTED);

        let health = client
            .get(format!("http://{}/healthz", handle.local_addr()))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(health, "ok");

        drop(client);
        handle.shutdown().await.unwrap();
    }
}
