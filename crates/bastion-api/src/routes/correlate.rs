//! Single-operation coverage.

use axum::{extract::State, routing::post, Json, Router};
use bastion_core::CoverageReport;

use crate::dto::CorrelateRequest;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/correlate", post(correlate))
}

/// Correlates one operation with the alerts raised while it ran.
///
/// Indexer or Caldera outages degrade the report and are listed in `errors`.
#[utoipa::path(
    post,
    path = "/api/correlate",
    request_body = CorrelateRequest,
    responses(
        (status = 200, description = "Coverage report"),
        (status = 400, description = "Invalid window, time or query", body = ErrorResponse),
        (status = 404, description = "Unknown operation", body = ErrorResponse)
    ),
    tag = "Correlation"
)]
pub async fn correlate(
    State(state): State<AppState>,
    Json(body): Json<CorrelateRequest>,
) -> Result<Json<CoverageReport>, ApiError> {
    let request = body
        .operation
        .into_request(&body.indexer, body.time_window_sec)?;
    let outcome = state.service.correlate_operation(request).await?;
    Ok(Json(outcome.report()))
}
