// GET handlers: version, devices, latest cycle

use axum::{extract::State, response::IntoResponse};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/devices: devices registered at bootstrap.
pub(super) async fn devices_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.devices.as_ref().clone())
}

/// GET /api/latest: summary of the last completed cycle, `null` before the first one.
pub(super) async fn latest_handler(State(state): State<AppState>) -> impl IntoResponse {
    let latest = state.summary_rx.borrow().clone();
    axum::Json(latest)
}
