//! API route handlers
//!
//! - Process health
//! - Camera snapshots and operator commands (override, open, close)
//! - Decision history
//! - Live snapshot/notice stream over WebSocket

mod cameras;
mod decisions;
mod live;
mod system;

pub use cameras::*;
pub use decisions::*;
pub use live::*;
pub use system::*;

use axum::response::Response;
use chrono::{DateTime, Utc};

use super::envelope::ApiErrorResponse;
use crate::controller::{ControllerError, GateHandle};
use crate::pipeline::CameraDirectory;
use crate::storage::DecisionLog;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Controller handles of all running cameras
    pub cameras: CameraDirectory,
    /// Local decision log, if enabled
    pub decisions: Option<DecisionLog>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(cameras: CameraDirectory, decisions: Option<DecisionLog>) -> Self {
        Self {
            cameras,
            decisions,
            started_at: Utc::now(),
        }
    }

    fn camera(&self, camera_id: &str) -> Result<GateHandle, Response> {
        self.cameras
            .get(camera_id)
            .ok_or_else(|| ApiErrorResponse::not_found(format!("unknown camera {}", camera_id)))
    }
}

/// Map a refused operator command to an HTTP error.
fn command_error(err: ControllerError) -> Response {
    match err {
        ControllerError::InvalidPlate(_) | ControllerError::NoPlate => {
            ApiErrorResponse::bad_request(err.to_string())
        }
        ControllerError::RequestInFlight
        | ControllerError::CloseInFlight
        | ControllerError::BarrierOpen
        | ControllerError::NoActuator => ApiErrorResponse::conflict(err.to_string()),
        ControllerError::Stopped => ApiErrorResponse::service_unavailable(err.to_string()),
    }
}
