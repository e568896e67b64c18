//! API route table, mounted at /api/v1

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Build the operator API router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Cameras
        .route("/cameras", get(handlers::list_cameras))
        .route("/cameras/:id", get(handlers::get_camera))
        .route(
            "/cameras/:id/override",
            post(handlers::set_override).delete(handlers::clear_override),
        )
        .route("/cameras/:id/open", post(handlers::open_barrier))
        .route("/cameras/:id/close", post(handlers::close_barrier))
        .route("/cameras/:id/ws", get(handlers::camera_ws))
        // History
        .route("/decisions", get(handlers::list_decisions))
        .with_state(state)
}
