//! Correlation and dashboard endpoint integration tests.

use axum::http::StatusCode;
use bastion_connectors::{ConnectorError, MockBehavior};
use chrono::Duration;
use serde_json::{json, Value};

use super::common::{create_test_lab, post_empty_request, post_json_request, send_request};

#[tokio::test]
async fn test_correlate_loads_chain_from_caldera() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/api/correlate", r#"{"operation": {"id": "op-1"}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["operation_id"], "op-1");
    assert_eq!(body["operation_name"], "Operation op-1");
    assert_eq!(body["attack_steps"], 2);
    assert_eq!(body["detected_steps"], 1);
    assert_eq!(body["total_alerts"], 1);
    assert_eq!(body["correlation"]["detection_rate"], 0.5);
    assert_eq!(body["correlation"]["undetected_techniques_list"], json!(["T1053"]));
    assert_eq!(body["alerts_matched"].as_array().unwrap().len(), 1);
    assert_eq!(body["agents"]["agent-a"], 1);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn test_correlate_inline_chain_with_wide_window() {
    let lab = create_test_lab().await;
    let at = |secs: i64| (lab.start + Duration::seconds(secs)).to_rfc3339();

    let request = json!({
        "operation": {
            "id": "adhoc",
            "name": "Inline run",
            "start": lab.start.to_rfc3339(),
            "chain": [
                {"id": "x1", "paw": "agent-a", "finish": at(100),
                 "ability": {"name": "Shell", "technique_id": "T1059", "tactic": "execution"}},
                {"id": "x2", "paw": "agent-a", "finish": at(200),
                 "ability": {"name": "Cron", "technique_id": "T1053", "tactic": "persistence"}}
            ]
        },
        "indexer": {"index": "wazuh-alerts-*", "verify_ssl": false},
        "time_window_sec": 300
    });
    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/api/correlate", &request.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation_name"], "Inline run");
    assert_eq!(body["time_window_sec"], 300);
    assert_eq!(body["detected_steps"], 2);
    assert_eq!(body["correlation"]["detection_rate"], 1.0);
    assert_eq!(lab.caldera.call_count(), 0);
}

#[tokio::test]
async fn test_correlate_rejects_non_positive_window() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request(
            "/api/correlate",
            r#"{"operation": {"id": "op-1"}, "time_window_sec": 0}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_WINDOW");
}

#[tokio::test]
async fn test_correlate_rejects_window_beyond_seven_days() {
    let lab = create_test_lab().await;

    for window in ["604801", "9223372036854775807"] {
        let body = format!(
            r#"{{"operation": {{"id": "op-1"}}, "time_window_sec": {}}}"#,
            window
        );
        let (status, body): (StatusCode, Value) = send_request(
            lab.app.clone(),
            post_json_request("/api/correlate", &body),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "window {}", window);
        assert_eq!(body["code"], "INVALID_WINDOW");
    }

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request(
            "/api/correlate",
            r#"{"operation": {"id": "op-1"}, "time_window_sec": 604800}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detected_steps"], 2);
}

#[tokio::test]
async fn test_correlate_unknown_operation() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/api/correlate", r#"{"operation": {"id": "nope"}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Operation not found: nope");
    assert_eq!(body["code"], "OPERATION_NOT_FOUND");
}

#[tokio::test]
async fn test_correlate_requires_operation_id() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, post_json_request("/api/correlate", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing operation.id");
}

#[tokio::test]
async fn test_correlate_with_indexer_down_degrades() {
    let lab = create_test_lab().await;
    lab.indexer
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed(
            "connection refused".into(),
        )))
        .await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/api/correlate", r#"{"operation": {"id": "op-1"}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attack_steps"], 2);
    assert_eq!(body["detected_steps"], 0);
    assert_eq!(body["correlation"]["detection_rate"], 0.0);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("indexer:"));
}

#[tokio::test]
async fn test_dashboard_summary_of_recent_operations() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, post_empty_request("/api/dashboard/summary")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["kpi"]["operations"], 1);
    assert_eq!(body["kpi"]["attack_steps"], 2);
    assert_eq!(body["kpi"]["detections"], 1);
    assert_eq!(body["kpi"]["detection_rate"], 0.5);
    assert_eq!(body["kpi"]["agents"], 1);
    assert!(body["kpi"]["last_seen"].is_string());
    assert_eq!(body["timeline"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dashboard_summary_with_nothing_recent() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/api/dashboard/summary", r#"{"hours": 0}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kpi"]["operations"], 0);
    assert_eq!(body["kpi"]["detection_rate"], 0.0);
    assert!(body["kpi"]["last_seen"].is_null());
}

#[tokio::test]
async fn test_dashboard_summary_surfaces_indexer_outage() {
    let lab = create_test_lab().await;
    lab.indexer
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed(
            "connection refused".into(),
        )))
        .await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/api/dashboard/summary", r#"{"operation": {"id": "op-1"}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kpi"]["attack_steps"], 2);
    assert_eq!(body["kpi"]["detections"], 0);
    let coverage_errors = body["coverage"]["errors"].as_array().unwrap();
    assert_eq!(coverage_errors.len(), 1);
    assert!(coverage_errors[0].as_str().unwrap().starts_with("indexer:"));
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("op-1: indexer:"));
}

#[tokio::test]
async fn test_dashboard_summary_skips_failed_operation() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request(
            "/api/dashboard/summary",
            r#"{"operations": [{"id": "op-1"}, {"id": "nope"}]}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kpi"]["operations"], 1);
    assert_eq!(body["kpi"]["detections"], 1);
    assert_eq!(body["operations"][0]["id"], "op-1");
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("nope: skipped:"));
}

#[tokio::test]
async fn test_dashboard_summary_min_level() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request(
            "/api/dashboard/summary",
            r#"{"operation": {"id": "op-1"}, "min_level": 12}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kpi"]["attack_steps"], 2);
    assert_eq!(body["kpi"]["detections"], 0);
    assert_eq!(body["kpi"]["alerts_total"], 0);
}
