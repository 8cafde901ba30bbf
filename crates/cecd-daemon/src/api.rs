//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cecd_discovery::{Attribute, AttributeError, AttributeValue};
use cecd_monitor::MonitorError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::commands::{self, Action, CommandError};
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiError::new(msg))).into_response()
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = match &self {
            CommandError::DeviceNotFound(_) | CommandError::UnknownAction(_) => {
                StatusCode::NOT_FOUND
            }
            CommandError::Attribute(AttributeError::Unknown(_)) => StatusCode::NOT_FOUND,
            CommandError::Attribute(AttributeError::ReadOnly(_)) => StatusCode::METHOD_NOT_ALLOWED,
            CommandError::Attribute(AttributeError::InvalidValue { .. })
            | CommandError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            CommandError::NotOnBus(_)
            | CommandError::NoPhysicalAddress(_)
            | CommandError::NoActiveSource => StatusCode::CONFLICT,
            CommandError::Monitor(MonitorError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            CommandError::Monitor(MonitorError::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            CommandError::Monitor(MonitorError::InvalidArgument(_))
            | CommandError::Monitor(MonitorError::Address(_)) => StatusCode::BAD_REQUEST,
            CommandError::Monitor(_) => StatusCode::BAD_GATEWAY,
        };
        debug!(status = %status, error = %self, "Request failed");
        error_response(status, self.to_string())
    }
}

/// Daemon and adapter status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status().await)
}

/// List all known devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.discovery.devices().await)
}

/// Get a specific device by name
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.discovery.device(&name).await {
        Some(device) => Json(device).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Device not found"),
    }
}

/// Body of an attribute write or action
#[derive(Deserialize)]
pub struct ValueRequest {
    #[serde(default)]
    value: Option<AttributeValue>,
}

/// Write a device attribute
pub async fn write_attribute(
    State(state): State<Arc<AppState>>,
    Path((name, attribute)): Path<(String, String)>,
    Json(req): Json<ValueRequest>,
) -> Result<impl IntoResponse, CommandError> {
    let attribute = Attribute::from_key(&attribute)?;
    let value = req
        .value
        .ok_or_else(|| CommandError::InvalidValue("missing value".to_string()))?;

    commands::write_attribute(&state, &name, attribute, &value).await?;
    Ok(Json(serde_json::json!({
        "device": name,
        "attribute": attribute,
        "value": value,
    })))
}

/// Run a bus-wide action
pub async fn run_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    Json(req): Json<ValueRequest>,
) -> Result<impl IntoResponse, CommandError> {
    let parsed = Action::parse(&action, req.value.as_ref())?;
    commands::run_action(&state, &parsed).await?;
    Ok(Json(serde_json::json!({"status": "sent", "action": action})))
}

#[derive(Deserialize)]
pub struct RawRequest {
    command: String,
}

/// Send a raw line to the adapter
pub async fn send_raw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RawRequest>,
) -> Result<impl IntoResponse, CommandError> {
    commands::send_raw(&state, &req.command).await?;
    Ok(Json(serde_json::json!({"status": "sent"})))
}

/// Ask the adapter to scan the bus
pub async fn trigger_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual bus scan requested");
    match state.monitor.write_raw("scan").await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"status": "scan_started"})),
        )
            .into_response(),
        Err(e) => CommandError::from(e).into_response(),
    }
}
