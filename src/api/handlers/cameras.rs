//! Camera endpoints: snapshots and operator commands

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{command_error, ApiState};
use crate::api::envelope::ApiResponse;
use crate::types::GateSnapshot;

/// GET /api/v1/cameras - Snapshots of all cameras, ordered by id
pub async fn list_cameras(State(state): State<ApiState>) -> Response {
    let snapshots: Vec<GateSnapshot> = state
        .cameras
        .handles()
        .iter()
        .map(|h| h.snapshot())
        .collect();
    ApiResponse::ok(snapshots)
}

/// GET /api/v1/cameras/:id
pub async fn get_camera(State(state): State<ApiState>, Path(camera_id): Path<String>) -> Response {
    match state.camera(&camera_id) {
        Ok(handle) => ApiResponse::ok(handle.snapshot()),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub plate_text: String,
}

/// POST /api/v1/cameras/:id/override - Manual plate entry
pub async fn set_override(
    State(state): State<ApiState>,
    Path(camera_id): Path<String>,
    Json(req): Json<OverrideRequest>,
) -> Response {
    let handle = match state.camera(&camera_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.set_override(req.plate_text).await {
        Ok(plate) => ApiResponse::ok(plate),
        Err(e) => command_error(e),
    }
}

#[derive(Debug, Serialize)]
pub struct OverrideCleared {
    pub cleared: bool,
}

/// DELETE /api/v1/cameras/:id/override
pub async fn clear_override(State(state): State<ApiState>, Path(camera_id): Path<String>) -> Response {
    let handle = match state.camera(&camera_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.clear_override().await {
        Ok(cleared) => ApiResponse::ok(OverrideCleared { cleared }),
        Err(e) => command_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenRequestBody {
    #[serde(default)]
    pub plate_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    pub camera_id: String,
    pub action: &'static str,
}

/// POST /api/v1/cameras/:id/open - Manual open, optionally with a plate
///
/// Answers 202 once the actuator call is issued; its outcome arrives as a
/// snapshot update and notice.
pub async fn open_barrier(
    State(state): State<ApiState>,
    Path(camera_id): Path<String>,
    body: Option<Json<OpenRequestBody>>,
) -> Response {
    let handle = match state.camera(&camera_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let plate = body.and_then(|Json(b)| b.plate_text);
    info!(camera_id = %camera_id, plate = ?plate, "[API] manual open requested");
    match handle.open(plate).await {
        Ok(()) => ApiResponse::accepted(CommandAccepted { camera_id, action: "open" }),
        Err(e) => command_error(e),
    }
}

/// POST /api/v1/cameras/:id/close
pub async fn close_barrier(State(state): State<ApiState>, Path(camera_id): Path<String>) -> Response {
    let handle = match state.camera(&camera_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    info!(camera_id = %camera_id, "[API] manual close requested");
    match handle.close().await {
        Ok(()) => ApiResponse::accepted(CommandAccepted { camera_id, action: "close" }),
        Err(e) => command_error(e),
    }
}
