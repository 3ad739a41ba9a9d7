//! Ad-hoc index discovery.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bastion_core::{DiscoverPage, DiscoverRequest};
use serde_json::{json, Value};

use crate::dto::DiscoverQuery;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/indices", get(indices))
        .route("/search", get(search_get).post(search_post))
}

/// Lists non-system indices with their health and document counts.
#[utoipa::path(
    get,
    path = "/discover/indices",
    responses(
        (status = 200, description = "Index list"),
        (status = 503, description = "Indexer unreachable", body = ErrorResponse)
    ),
    tag = "Discover"
)]
pub async fn indices(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let indices = state.service.list_indices().await?;
    Ok(Json(json!({ "indices": indices })))
}

/// Searches an index with query-string parameters.
#[utoipa::path(
    get,
    path = "/discover/search",
    params(DiscoverQuery),
    responses(
        (status = 200, description = "One page of flattened hits"),
        (status = 400, description = "Malformed query or time range", body = ErrorResponse),
        (status = 503, description = "Indexer unreachable", body = ErrorResponse)
    ),
    tag = "Discover"
)]
pub async fn search_get(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<DiscoverPage>, ApiError> {
    run(&state, query.into()).await
}

/// Searches an index; the body may also carry exact-match `filters`.
#[utoipa::path(
    post,
    path = "/discover/search",
    responses(
        (status = 200, description = "One page of flattened hits"),
        (status = 400, description = "Malformed query or time range", body = ErrorResponse),
        (status = 503, description = "Indexer unreachable", body = ErrorResponse)
    ),
    tag = "Discover"
)]
pub async fn search_post(
    State(state): State<AppState>,
    body: Option<Json<DiscoverRequest>>,
) -> Result<Json<DiscoverPage>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    run(&state, request).await
}

async fn run(state: &AppState, request: DiscoverRequest) -> Result<Json<DiscoverPage>, ApiError> {
    let page = state.service.events().discover(&request).await?;
    Ok(Json(page))
}
