//! Health check endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use bastion_connectors::{Connector, ConnectorHealth, ManagerConnector};
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Instant;

use crate::dto::HealthResponse;
use crate::state::AppState;

/// Start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/plugin/bas_wazuh/health", get(plugin_health))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Health of the plugin and its Wazuh dependencies.
///
/// Always 200; dependency state is reported in the body.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Plugin and dependency health", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    let (manager, indexer) = tokio::join!(
        state.manager.health_check(),
        state.service.events().cluster_status()
    );
    let wazuh_manager = manager.unwrap_or(ConnectorHealth::Unknown);

    Json(HealthResponse {
        plugin: "healthy".to_string(),
        wazuh_manager: wazuh_manager.label().to_string(),
        wazuh_indexer: indexer,
        authenticated: state.manager.is_authenticated().await,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
    })
}

async fn plugin_health() -> Json<Value> {
    Json(json!({"status": "ok", "plugin": "bas_wazuh"}))
}

/// Readiness: the indexer answers a cluster health request.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Ready to serve correlations"),
        (status = 503, description = "Indexer unreachable")
    ),
    tag = "Health"
)]
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let indexer = state.service.events().cluster_status().await;
    let ready = indexer != "unreachable" && indexer != "red";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({"ready": ready, "wazuh_indexer": indexer})))
}

/// Liveness: the process is serving requests.
#[utoipa::path(
    get,
    path = "/live",
    responses((status = 200, description = "Alive")),
    tag = "Health"
)]
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
