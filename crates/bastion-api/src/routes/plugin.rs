//! Detection export for the Caldera plugin page.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::dto::{parse_window, ExportPayload, PluginQuery};
use crate::error::{ApiError, ErrorResponse};
use crate::routes::detections::required_op_id;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/plugin/bas_wazuh/download", get(download))
        .route("/plugin/bw/download", get(download))
}

/// Downloads the per-step detections of one operation as a JSON file.
#[utoipa::path(
    get,
    path = "/plugin/bas_wazuh/download",
    params(PluginQuery),
    responses(
        (status = 200, description = "JSON attachment", content_type = "application/json"),
        (status = 400, description = "Missing op_id", body = ErrorResponse),
        (status = 404, description = "Unknown operation", body = ErrorResponse)
    ),
    tag = "Plugin"
)]
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<PluginQuery>,
) -> Result<Response, ApiError> {
    let op_id = required_op_id(query.op_id)?;
    let report = state
        .service
        .detections(&op_id, parse_window(query.window.as_deref()), None)
        .await?;

    let payload = ExportPayload {
        operation_id: report.operation_id,
        generated_at: report.generated_at,
        time_window_sec: report.time_window_sec,
        results: report.results,
    };
    let body = serde_json::to_string_pretty(&payload)?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"bw_results_{}.json\"",
        sanitize_filename(&op_id)
    ))
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Keeps `[A-Za-z0-9_-]`; anything else becomes `_`.
fn sanitize_filename(op_id: &str) -> String {
    op_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
