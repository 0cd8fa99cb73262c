//! REST API handlers.

use crate::state::{FrequencyPayload, SharedState};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use gf_common::metrics::CountersSnapshot;
use gf_common::state::MonitorState;
use serde::Serialize;
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, `starting`, `fault` or `stopped`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Lifecycle state the status was derived from.
    pub state: MonitorState,
}

/// Health check endpoint.
///
/// GET /health
///
/// 503 once the edge source has failed.
pub async fn health_check(Extension(state): Extension<Arc<SharedState>>) -> impl IntoResponse {
    let monitor_state = state.monitor_state();
    let (code, status) = match monitor_state {
        MonitorState::Running => (StatusCode::OK, "ok"),
        MonitorState::Fault => (StatusCode::SERVICE_UNAVAILABLE, "fault"),
        MonitorState::Boot | MonitorState::Connecting => (StatusCode::OK, "starting"),
        MonitorState::Stopped => (StatusCode::OK, "stopped"),
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            state: monitor_state,
        }),
    )
}

/// Latest estimate in the published payload shape.
///
/// GET /api/estimate
pub async fn get_estimate(
    Extension(state): Extension<Arc<SharedState>>,
) -> Json<FrequencyPayload> {
    Json(state.payload())
}

/// Engine counters.
///
/// GET /api/counters
pub async fn get_counters(
    Extension(state): Extension<Arc<SharedState>>,
) -> Json<CountersSnapshot> {
    Json(state.engine().counters())
}
