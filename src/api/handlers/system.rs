//! Process health

use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;

use super::ApiState;
use crate::api::envelope::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub cameras: usize,
    /// Cameras whose detection feed is up
    pub cameras_online: usize,
    /// Cameras with a connected video session
    pub streams_connected: usize,
    pub decision_log: bool,
}

/// GET /api/v1/health
pub async fn health(State(state): State<ApiState>) -> Response {
    let snapshots: Vec<_> = state.cameras.handles().iter().map(|h| h.snapshot()).collect();
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        cameras: snapshots.len(),
        cameras_online: snapshots.iter().filter(|s| s.health.is_online()).count(),
        streams_connected: snapshots.iter().filter(|s| s.health.video.is_connected()).count(),
        decision_log: state.decisions.is_some(),
    })
}
