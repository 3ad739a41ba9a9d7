//! Dashboard summary.

use axum::{extract::State, routing::post, Json, Router};
use bastion_core::DashboardSummary;

use crate::dto::DashboardRequest;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/summary", post(summary))
}

/// Builds KPIs, tactic coverage and the alert timeline.
///
/// With no operation in the body, the Caldera operations started within
/// `hours` (default 24) are summarised. `min_level` drops alerts below that
/// rule level. Degraded lookups and skipped operations are listed in
/// `errors`.
#[utoipa::path(
    post,
    path = "/api/dashboard/summary",
    request_body = DashboardRequest,
    responses(
        (status = 200, description = "Dashboard summary"),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "Dashboard"
)]
pub async fn summary(
    State(state): State<AppState>,
    body: Option<Json<DashboardRequest>>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let (hours, min_level) = (body.hours, body.min_level);
    let requests = body.into_requests()?;
    let summary = state
        .service
        .dashboard_summary(requests, hours, min_level)
        .await?;
    state
        .metrics
        .record_dashboard(summary.kpi.operations, summary.kpi.detection_rate)
        .await;
    Ok(Json(summary))
}
