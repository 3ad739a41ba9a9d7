//! Caldera plugin page and export integration tests.

use axum::http::{header, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use super::common::{create_test_lab, get_request, send_request, send_request_raw};

#[tokio::test]
async fn test_download_is_a_json_attachment() {
    let lab = create_test_lab().await;

    let response = lab
        .app
        .oneshot(get_request("/plugin/bas_wazuh/download?op_id=op-1&window=300"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"bw_results_op-1.json\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["operation_id"], "op-1");
    assert_eq!(body["time_window_sec"], 300);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"][1]["detected"], true);
}

#[tokio::test]
async fn test_download_errors() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app.clone(), get_request("/plugin/bas_wazuh/download")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing op_id");

    let (status, body): (StatusCode, Value) = send_request(
        lab.app,
        get_request("/plugin/bas_wazuh/download?op_id=nope"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Operation not found: nope");
}

#[tokio::test]
async fn test_gui_defaults_to_latest_operation() {
    let lab = create_test_lab().await;

    let (status, html) = send_request_raw(lab.app, get_request("/plugin/bas_wazuh/gui")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("value=\"op-1\" selected"));
    assert!(html.contains("1 of 2 steps detected (50.0%)"));
    assert!(html.contains("T1059"));
    assert!(html.contains("T1053"));
}

#[tokio::test]
async fn test_gui_shows_unknown_operation_inline() {
    let lab = create_test_lab().await;

    let (status, html) =
        send_request_raw(lab.app, get_request("/plugin/bas_wazuh/gui?op_id=nope")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Operation not found: nope"));
}
