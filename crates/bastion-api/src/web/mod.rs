//! Results page served inside the Caldera plugin frame.

mod templates;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::warn;

use crate::dto::{parse_window, PluginQuery};
use crate::state::AppState;
pub use templates::{OperationOption, PluginGuiTemplate, ResultRow, ResultsView};

/// Creates the web router.
pub fn create_web_router(state: AppState) -> Router {
    Router::new()
        .route("/plugin/bas_wazuh/gui", get(plugin_gui))
        .route("/plugin/bas_wazuh", get(plugin_gui))
        .route("/plugins/bas_wazuh", get(plugin_gui))
        .route("/plugin/bw/gui", get(plugin_gui))
        .with_state(state)
}

/// Operation selector and per-step detection table. Without `op_id` the
/// most recently started operation is shown. Failures are rendered on the
/// page rather than returned as errors.
async fn plugin_gui(
    State(state): State<AppState>,
    Query(query): Query<PluginQuery>,
) -> impl IntoResponse {
    let mut error = None;
    let ops = match state.service.list_operations().await {
        Ok(ops) => ops,
        Err(e) => {
            warn!(error = %e, "Could not list operations for results page");
            error = Some(e.to_string());
            Vec::new()
        }
    };

    let selected_op_id = query
        .op_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| ops.first().map(|op| op.id.clone()));

    let mut time_window_sec = parse_window(query.window.as_deref())
        .filter(|w| *w > 0)
        .unwrap_or_else(|| state.default_window());
    let mut results = None;
    if let Some(op_id) = &selected_op_id {
        match state
            .service
            .detections(op_id, Some(time_window_sec), None)
            .await
        {
            Ok(report) => {
                time_window_sec = report.time_window_sec;
                results = Some(ResultsView::from(report));
            }
            Err(e) => error = Some(e.to_string()),
        }
    }

    HtmlTemplate(PluginGuiTemplate {
        ops: ops
            .iter()
            .map(|op| OperationOption::new(op, selected_op_id.as_deref()))
            .collect(),
        selected_op_id,
        results,
        time_window_sec,
        error,
    })
}

/// Wrapper for rendering Askama templates as HTML responses.
pub struct HtmlTemplate<T>(pub T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: askama::Template,
{
    fn into_response(self) -> Response {
        use axum::response::Html;

        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => {
                tracing::error!("Template rendering error: {}", err);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Template error: {}", err),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askama::Template;
    use bastion_core::OperationMeta;
    use chrono::{TimeZone, Utc};

    fn template(error: Option<String>, results: Option<ResultsView>) -> PluginGuiTemplate {
        let op = OperationMeta {
            id: "op-1".into(),
            name: "Discovery run".into(),
            state: "finished".into(),
            start: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            end: None,
        };
        PluginGuiTemplate {
            ops: vec![OperationOption::new(&op, Some("op-1"))],
            selected_op_id: Some("op-1".into()),
            results,
            time_window_sec: 60,
            error,
        }
    }

    #[test]
    fn test_selector_marks_selected_operation() {
        let html = template(None, None).render().unwrap();
        assert!(html.contains("Discovery run (2024-05-01 10:00:00)"));
        assert!(html.contains("value=\"op-1\" selected"));
    }

    #[test]
    fn test_error_is_escaped() {
        let html = template(Some("<boom>".into()), None).render().unwrap();
        assert!(html.contains("&lt;boom&gt;"));
        assert!(!html.contains("<boom>"));
    }

    #[test]
    fn test_results_table() {
        let results = ResultsView {
            operation_name: "Discovery run".into(),
            detected_steps: 1,
            eligible_steps: 2,
            detection_rate_pct: "50.0".into(),
            rows: vec![ResultRow {
                link_id: "l1".into(),
                ability_name: "Whoami".into(),
                technique_id: "T1033".into(),
                executed_at: "2024-05-01 10:01:00".into(),
                detected: true,
                match_count: 2,
                confidence: "0.50".into(),
                alert: "92000 Suspicious whoami".into(),
                alert_time: "2024-05-01 10:01:03".into(),
            }],
            errors: vec!["indexer: timeout".into()],
        };
        let html = template(None, Some(results)).render().unwrap();
        assert!(html.contains("50.0%"));
        assert!(html.contains("T1033"));
        assert!(html.contains("indexer: timeout"));
    }
}
