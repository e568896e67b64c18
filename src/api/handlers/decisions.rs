//! Decision history endpoint

use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults::{DEFAULT_DECISION_LIMIT, MAX_DECISION_LIMIT};

#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    pub limit: Option<usize>,
    pub camera_id: Option<String>,
}

/// GET /api/v1/decisions?limit=&camera_id= - Newest first
pub async fn list_decisions(State(state): State<ApiState>, Query(q): Query<DecisionQuery>) -> Response {
    let Some(log) = state.decisions.as_ref() else {
        return ApiErrorResponse::service_unavailable("decision log is disabled");
    };
    let limit = q.limit.unwrap_or(DEFAULT_DECISION_LIMIT).clamp(1, MAX_DECISION_LIMIT);
    ApiResponse::ok(log.recent(limit, q.camera_id.as_deref()))
}
