// Read-only HTTP status surface

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::models::{CycleSummary, DeviceProperties};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) devices: Arc<Vec<DeviceProperties>>,
    pub(crate) summary_rx: watch::Receiver<Option<CycleSummary>>,
}

pub fn app(
    devices: Arc<Vec<DeviceProperties>>,
    summary_rx: watch::Receiver<Option<CycleSummary>>,
) -> Router {
    let state = AppState {
        devices,
        summary_rx,
    };
    Router::new()
        .route("/", get(|| async { "gpulogger is running" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/devices", get(http::devices_handler)) // GET /api/devices
        .route("/api/latest", get(http::latest_handler)) // GET /api/latest
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
