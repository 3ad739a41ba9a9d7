//! Operation, detection and discover endpoint integration tests.

use axum::http::StatusCode;
use bastion_connectors::{ConnectorError, MockBehavior};
use serde_json::Value;

use super::common::{
    create_test_lab, get_request, post_empty_request, post_json_request, send_request,
};

#[tokio::test]
async fn test_list_operations() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/operations/list")).await;

    assert_eq!(status, StatusCode::OK);
    let ops = body["ops"].as_array().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["id"], "op-1");
    assert_eq!(ops[0]["name"], "Operation op-1");
    assert_eq!(ops[0]["state"], "finished");
    assert!(ops[0]["start"].is_string());
}

#[tokio::test]
async fn test_list_operations_with_caldera_down() {
    let lab = create_test_lab().await;
    lab.caldera
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed(
            "refused".into(),
        )))
        .await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/operations/list")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_start_operation_returns_events_and_caches() {
    let lab = create_test_lab().await;
    let body = r#"{"op_id": "op-1", "time_window_sec": 3600}"#;

    let (status, first): (StatusCode, Value) = send_request(
        lab.app.clone(),
        post_json_request("/operations/start", body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["operation_id"], "op-1");
    assert_eq!(first["time_window_sec"], 3600);
    assert_eq!(first["cached"], false);
    let events = first["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["link_id"], "l1");
    assert_eq!(events[0]["technique_id"], "T1059");
    assert!(events[0]["executed_at"].is_string());

    let calls = lab.caldera.call_count();
    let (status, second): (StatusCode, Value) =
        send_request(lab.app, post_json_request("/operations/start", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(lab.caldera.call_count(), calls);
}

#[tokio::test]
async fn test_start_operation_reads_query_string() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_empty_request("/operations/start?op_id=op-1&time_window_sec=3600"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_operation_without_window_returns_full_chain() {
    let lab = create_test_lab().await;
    let body = r#"{"op_id": "op-1"}"#;

    let (status, first): (StatusCode, Value) = send_request(
        lab.app.clone(),
        post_json_request("/operations/start", body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(first["time_window_sec"].is_null());
    assert_eq!(first["events"].as_array().unwrap().len(), 2);
    assert_eq!(first["cached"], false);

    let (_, windowed): (StatusCode, Value) = send_request(
        lab.app.clone(),
        post_json_request("/operations/start", r#"{"op_id": "op-1", "time_window_sec": 60}"#),
    )
    .await;
    assert_eq!(windowed["cached"], false);
    assert!(windowed["events"].as_array().unwrap().is_empty());

    let (_, again): (StatusCode, Value) =
        send_request(lab.app, post_json_request("/operations/start", body)).await;
    assert_eq!(again["cached"], true);
    assert_eq!(again["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_operation_rejects_oversized_window() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request(
            "/operations/start",
            r#"{"op_id": "op-1", "time_window_sec": 9223372036854775807}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_WINDOW");
}

#[tokio::test]
async fn test_start_operation_missing_op_id() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, post_json_request("/operations/start", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing op_id");
}

#[tokio::test]
async fn test_start_operation_unknown() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request("/operations/start", r#"{"op_id": "nope"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Operation not found: nope");
}

#[tokio::test]
async fn test_detections_rows() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/detections?op_id=op-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation_id"], "op-1");
    assert_eq!(body["time_window_sec"], 60);
    let rows = body["results"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["detected"], true);
    assert_eq!(rows[0]["matches"][0]["id"], "w1");
    assert_eq!(rows[1]["detected"], false);
    assert_eq!(body["coverage"]["correlation"]["detection_rate"], 0.5);
}

#[tokio::test]
async fn test_detections_missing_op_id() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/detections")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing op_id");
}

#[tokio::test]
async fn test_discover_indices_under_both_prefixes() {
    let lab = create_test_lab().await;

    for uri in ["/discover/indices", "/api/discover/indices"] {
        let (status, body): (StatusCode, Value) =
            send_request(lab.app.clone(), get_request(uri)).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        let indices = body["indices"].as_array().unwrap();
        assert!(!indices.is_empty());
        assert!(indices[0]["index"]
            .as_str()
            .unwrap()
            .starts_with("wazuh-alerts-"));
    }
}

#[tokio::test]
async fn test_discover_search_get_and_post() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app.clone(),
        get_request("/discover/search?q=rule.id:92000&from=now-1h&fields=rule.id,agent.name"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["rows"][0]["_id"], "w1");

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        post_json_request(
            "/api/discover/search",
            r#"{"from": "now-1h", "filters": {"rule.id": ["92000", "92100"]}}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["columns"][0], "@timestamp");
}

#[tokio::test]
async fn test_discover_search_rejects_bad_query() {
    let lab = create_test_lab().await;
    lab.indexer
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::BadRequest(
            "Failed to parse query [rule.id:(]".into(),
        )))
        .await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/discover/search?q=rule.id:(")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "QUERY_ERROR");
    assert_eq!(body["error"], "Failed to parse query [rule.id:(]");
}
