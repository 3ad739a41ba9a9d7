//! Health check endpoint integration tests.

use axum::http::StatusCode;
use bastion_connectors::{ConnectorError, MockBehavior};
use serde_json::Value;

use super::common::{create_test_lab, get_request, send_request, send_request_raw};

#[tokio::test]
async fn test_api_health_reports_dependencies() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plugin"], "healthy");
    assert_eq!(body["wazuh_manager"], "healthy");
    assert_eq!(body["wazuh_indexer"], "green");
    assert_eq!(body["authenticated"], false);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_api_health_with_unreachable_indexer() {
    let lab = create_test_lab().await;
    lab.indexer
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed(
            "connection refused".into(),
        )))
        .await;
    lab.manager
        .set_behavior(MockBehavior::Unhealthy("401".into()))
        .await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wazuh_indexer"], "unreachable");
    assert_eq!(body["wazuh_manager"], "unhealthy");
}

#[tokio::test]
async fn test_ready_follows_indexer() {
    let lab = create_test_lab().await;
    let (status, _) = send_request_raw(lab.app.clone(), get_request("/ready")).await;
    assert_eq!(status, StatusCode::OK);

    lab.indexer
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::Timeout("10s".into())))
        .await;
    let (status, body): (StatusCode, Value) = send_request(lab.app, get_request("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_live_and_plugin_health() {
    let lab = create_test_lab().await;

    let (status, _) = send_request_raw(lab.app.clone(), get_request("/live")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/plugin/bas_wazuh/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["plugin"], "bas_wazuh");
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let lab = create_test_lab().await;
    let response = tower::ServiceExt::oneshot(lab.app, get_request("/live"))
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let lab = create_test_lab().await;
    let (status, body) = send_request_raw(lab.app, get_request("/metrics")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("not initialized"));
}
