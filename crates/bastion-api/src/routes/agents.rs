//! Agent inventory and the recent alerts feed.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bastion_core::{AgentInventory, RecentAlerts};

use crate::dto::{AgentsQuery, AlertsQuery};
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/agents", get(agents))
        .route("/alerts", get(recent_alerts))
}

/// Lists Caldera agents with their Wazuh agent and recent detections.
///
/// Agents are matched to Wazuh by host name. An unreachable manager or
/// indexer leaves the matches or detections empty and is listed in `errors`.
#[utoipa::path(
    get,
    path = "/api/agents",
    params(AgentsQuery),
    responses(
        (status = 200, description = "Agent inventory"),
        (status = 502, description = "Caldera unavailable", body = ErrorResponse)
    ),
    tag = "Agents"
)]
pub async fn agents(
    State(state): State<AppState>,
    Query(query): Query<AgentsQuery>,
) -> Result<Json<AgentInventory>, ApiError> {
    let inventory = state
        .service
        .agents_with_detections(state.manager.as_ref(), query.hours)
        .await?;
    Ok(Json(inventory))
}

/// Recent alerts at or above `min_level`, newest first.
///
/// Alerts without ATT&CK data get a technique from the rule map.
#[utoipa::path(
    get,
    path = "/api/alerts",
    params(AlertsQuery),
    responses(
        (status = 200, description = "Recent alerts"),
        (status = 503, description = "Indexer unavailable", body = ErrorResponse)
    ),
    tag = "Agents"
)]
pub async fn recent_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<RecentAlerts>, ApiError> {
    let feed = state
        .service
        .recent_alerts(query.hours, query.min_level, query.index.as_deref())
        .await?;
    Ok(Json(feed))
}
