//! API routes.

pub mod agents;
pub mod correlate;
pub mod dashboard;
pub mod detections;
pub mod discover;
pub mod health;
pub mod metrics;
pub mod operations;
pub mod plugin;

use crate::state::AppState;
use axum::Router;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .nest("/operations", operations::routes())
        .nest("/discover", discover::routes())
        .merge(detections::routes())
        .nest("/plugin/bastion", agents::routes())
        .merge(plugin::routes())
        .merge(health::routes())
        .merge(metrics::routes())
        .with_state(state)
}

/// API routes under /api prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(correlate::routes())
        .merge(agents::routes())
        .nest("/dashboard", dashboard::routes())
        .nest("/discover", discover::routes())
}
