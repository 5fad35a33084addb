//! ---
//! scs_section: "05-networking-external-interfaces"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Request handlers and shared state for the HTTP adapter."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sysconf_lifecycle::{JobTicket, PowerAction, PowerJobs, ReadinessFlag, SystemInfo, SystemTelemetry};
use sysconf_settings::{
    Choice, GeneralSettings, GeneralSettingsPatch, GeneralSettingsService, SettingsError,
};
use tracing::{error, warn};

use crate::metrics::ServiceMetrics;

/// Everything the handlers need.
pub struct ApiState {
    pub settings: Arc<GeneralSettingsService>,
    pub readiness: ReadinessFlag,
    pub power: PowerJobs,
    pub telemetry: SystemTelemetry,
    pub metrics: Option<ServiceMetrics>,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "message": message.into() }),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Validation(verrors) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({ "errors": verrors }),
            },
            other => {
                error!(error = %other, "settings operation failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Run filesystem-bound settings work (zoneinfo walk, JSON store rewrite) off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        error!(error = %err, "blocking settings task failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "settings task failed")
    })
}

pub(crate) async fn get_general(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<GeneralSettings>, ApiError> {
    Ok(Json(state.settings.current()?))
}

pub(crate) async fn put_general(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<GeneralSettingsPatch>, JsonRejection>,
) -> Result<Json<GeneralSettings>, ApiError> {
    let Json(patch) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "malformed settings patch");
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: json!({
                "errors": [{ "attribute": "general_settings", "message": rejection.body_text() }]
            }),
        }
    })?;

    let settings = Arc::clone(&state.settings);
    let empty = patch.is_empty();
    let outcome = blocking(move || settings.update(&patch)).await?;
    match outcome {
        Ok(settings) => {
            if let Some(metrics) = &state.metrics {
                if !empty {
                    metrics.record_update();
                }
            }
            Ok(Json(settings))
        }
        Err(err) => {
            if let (Some(metrics), Some(_)) = (&state.metrics, err.validation_errors()) {
                metrics.record_validation_failure();
            }
            Err(err.into())
        }
    }
}

pub(crate) async fn get_timezones(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let settings = Arc::clone(&state.settings);
    let zones = blocking(move || settings.timezone_choices()).await?;
    Ok(Json(zones.as_ref().clone()))
}

pub(crate) async fn get_kbdmaps(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Choice>>, ApiError> {
    let settings = Arc::clone(&state.settings);
    let maps = blocking(move || settings.keyboard_map_choices()).await?;
    Ok(Json(maps.as_ref().clone()))
}

pub(crate) async fn get_languages(State(state): State<Arc<ApiState>>) -> Json<Vec<Choice>> {
    Json(state.settings.language_choices())
}

pub(crate) async fn get_ready(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({
        "ready": state.readiness.is_ready(),
        "since": state.readiness.ready_since(),
    }))
}

pub(crate) async fn get_info(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<SystemInfo>, ApiError> {
    let timezone = state.settings.current()?.timezone;
    Ok(Json(state.telemetry.info(timezone).await))
}

pub(crate) async fn get_version(State(state): State<Arc<ApiState>>) -> Json<String> {
    Json(state.telemetry.version())
}

/// Optional body of the power endpoints.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PowerRequest {
    #[serde(default)]
    pub delay: Option<u64>,
}

pub(crate) async fn post_reboot(
    State(state): State<Arc<ApiState>>,
    body: Option<Json<PowerRequest>>,
) -> (StatusCode, Json<JobTicket>) {
    submit_power(&state, PowerAction::Reboot, body)
}

pub(crate) async fn post_shutdown(
    State(state): State<Arc<ApiState>>,
    body: Option<Json<PowerRequest>>,
) -> (StatusCode, Json<JobTicket>) {
    submit_power(&state, PowerAction::Shutdown, body)
}

fn submit_power(
    state: &ApiState,
    action: PowerAction,
    body: Option<Json<PowerRequest>>,
) -> (StatusCode, Json<JobTicket>) {
    let delay = body.and_then(|Json(request)| request.delay);
    let job = state.power.submit(action, delay);
    if let Some(metrics) = &state.metrics {
        metrics.record_power_job(action.as_str());
    }
    (StatusCode::ACCEPTED, Json(job.ticket))
}

pub(crate) async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    match &state.metrics {
        Some(metrics) => metrics.render(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}

pub(crate) async fn healthz() -> &'static str {
    "ok"
}
