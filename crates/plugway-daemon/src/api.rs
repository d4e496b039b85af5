//! REST API handlers

use axum::{
    extract::{Path, State},
    Json,
};
use plugway_core::{ControlError, DeviceControl, DeviceId};
use plugway_discovery::{DeviceSummary, ScanOutcome, ScannedDevice};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Resolve an id or display name and open a client for it
async fn connect(state: &AppState, id: &str) -> Result<Box<dyn DeviceControl>, ApiError> {
    let handle = state.resolver.resolve(id).await?;
    Ok(state.connector.connect(&handle))
}

/// Run a device call, giving up after the configured client timeout
async fn bounded<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, ControlError>>,
) -> Result<T, ControlError> {
    let limit = state.control_timeout();
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ControlError::Timeout(limit.as_secs())))
}

/// Trigger a discovery scan
pub async fn trigger_scan(
    State(state): State<Arc<AppState>>,
) -> ApiResult<BTreeMap<DeviceId, ScannedDevice>> {
    info!("Manual scan triggered");

    // Run detached so a caller hanging up does not cut the scan short
    let scanner = state.scanner.clone();
    let timeout = state.scan_timeout();
    let outcome = tokio::spawn(async move { scanner.trigger_scan(timeout).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Scan task failed: {}", e)))??;

    match outcome {
        ScanOutcome::Completed(report) => Ok(Json(report.devices)),
        ScanOutcome::AlreadyInProgress => Err(ApiError::ScanInProgress),
    }
}

/// List catalog devices with their current locations
pub async fn list_devices(State(state): State<Arc<AppState>>) -> ApiResult<Vec<DeviceSummary>> {
    Ok(Json(state.resolver.devices().await?))
}

/// Raw device status
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let device = connect(&state, &id).await?;
    let status = bounded(&state, device.status()).await?;
    debug!(device = %id, "Fetched device status");
    Ok(Json(status.into_inner()))
}

/// Whether the outlet is switched on
pub async fn is_on(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Value> {
    let device = connect(&state, &id).await?;
    let status = bounded(&state, device.status()).await?;
    Ok(Json(json!({ "on": status.is_on() })))
}

/// Switch the outlet on
pub async fn turn_on(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let device = connect(&state, &id).await?;
    bounded(&state, device.turn_on()).await?;
    info!(device = %id, "Device turned on");
    Ok(Json(json!({ "result": "Device turned ON" })))
}

/// Switch the outlet off
pub async fn turn_off(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let device = connect(&state, &id).await?;
    bounded(&state, device.turn_off()).await?;
    info!(device = %id, "Device turned off");
    Ok(Json(json!({ "result": "Device turned OFF" })))
}

/// Flip the outlet based on its current state
pub async fn toggle(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Value> {
    let device = connect(&state, &id).await?;
    let status = bounded(&state, device.status()).await?;

    if status.is_on() {
        bounded(&state, device.turn_off()).await?;
        info!(device = %id, "Device toggled off");
        Ok(Json(json!({ "result": "Device toggled OFF" })))
    } else {
        bounded(&state, device.turn_on()).await?;
        info!(device = %id, "Device toggled on");
        Ok(Json(json!({ "result": "Device toggled ON" })))
    }
}
