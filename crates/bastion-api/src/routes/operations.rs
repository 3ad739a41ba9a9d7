//! Caldera operation listing and start.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::dto::{
    window_from_value, OperationEvent, OperationListItem, OperationsListResponse, StartRequest,
    StartResponse,
};
use crate::error::{ApiError, ErrorResponse};
use crate::routes::detections::required_op_id;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/list", get(list_operations))
        .route("/start", post(start_operation))
}

/// Lists Caldera operations, most recently started first.
#[utoipa::path(
    get,
    path = "/operations/list",
    responses(
        (status = 200, description = "Known operations", body = OperationsListResponse),
        (status = 502, description = "Caldera unavailable", body = ErrorResponse)
    ),
    tag = "Operations"
)]
pub async fn list_operations(
    State(state): State<AppState>,
) -> Result<Json<OperationsListResponse>, ApiError> {
    let ops = state
        .service
        .list_operations()
        .await?
        .into_iter()
        .map(|op| OperationListItem {
            name: if op.name.is_empty() { op.id.clone() } else { op.name },
            id: op.id,
            start: op.start,
            state: op.state,
        })
        .collect();
    Ok(Json(OperationsListResponse { ops }))
}

/// Starts an operation that has not run yet and returns its executed steps.
///
/// `op_id` and `time_window_sec` are read from the JSON body, then from the
/// query string. Without a window the whole chain is returned.
#[utoipa::path(
    post,
    path = "/operations/start",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Operation events", body = StartResponse),
        (status = 400, description = "Missing op_id or invalid window", body = ErrorResponse),
        (status = 404, description = "Unknown operation", body = ErrorResponse)
    ),
    tag = "Operations"
)]
pub async fn start_operation(
    State(state): State<AppState>,
    Query(query): Query<StartRequest>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let op_id = required_op_id(body.op_id.or(query.op_id))?;
    let window = window_from_value(body.time_window_sec.as_ref())
        .or_else(|| window_from_value(query.time_window_sec.as_ref()));

    let started = state.service.start_operation(&op_id, window).await?;
    info!(
        operation_id = %op_id,
        steps = started.chain.steps.len(),
        cached = started.cached,
        "Operation started"
    );

    Ok(Json(StartResponse {
        operation_id: op_id,
        events: started.chain.steps.iter().map(OperationEvent::from).collect(),
        time_window_sec: window,
        cached: started.cached,
    }))
}
