//! Per-step detections for one operation.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bastion_core::DetectionReport;

use crate::dto::{parse_window, DetectionsQuery};
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/detections", get(detections))
}

/// Correlates the operation's full chain and returns one row per step.
#[utoipa::path(
    get,
    path = "/detections",
    params(DetectionsQuery),
    responses(
        (status = 200, description = "Per-step detections"),
        (status = 400, description = "Missing op_id", body = ErrorResponse),
        (status = 404, description = "Unknown operation", body = ErrorResponse)
    ),
    tag = "Detections"
)]
pub async fn detections(
    State(state): State<AppState>,
    Query(query): Query<DetectionsQuery>,
) -> Result<Json<DetectionReport>, ApiError> {
    let op_id = required_op_id(query.op_id)?;
    let window = parse_window(query.time_window_sec.as_deref());
    let index = query.index.filter(|i| !i.trim().is_empty());
    let report = state.service.detections(&op_id, window, index).await?;
    Ok(Json(report))
}

/// Trims `op_id`, rejecting it when absent or blank.
pub(crate) fn required_op_id(op_id: Option<String>) -> Result<String, ApiError> {
    op_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::missing("op_id"))
}
