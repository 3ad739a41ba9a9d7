//! Agent inventory and recent alerts endpoint integration tests.

use axum::http::StatusCode;
use bastion_connectors::testing::{sample_caldera_agent, sample_wazuh_agent};
use bastion_connectors::{ConnectorError, MockBehavior};
use chrono::Utc;
use serde_json::Value;

use super::common::{create_test_lab, get_request, send_request, TestLab};

async fn lab_with_agents() -> TestLab {
    let lab = create_test_lab().await;
    lab.caldera
        .add_agent(sample_caldera_agent("paw-a", "agent-a", Utc::now()))
        .await;
    lab.caldera
        .add_agent(sample_caldera_agent("paw-b", "agent-b", lab.start))
        .await;
    lab.manager.add_agent(sample_wazuh_agent("001", "agent-a")).await;
    lab
}

fn down() -> MockBehavior {
    MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed("connection refused".into()))
}

#[tokio::test]
async fn test_agents_matched_with_detections() {
    let lab = lab_with_agents().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/agents?hours=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["total_agents"], 2);
    assert!(body["errors"].as_array().unwrap().is_empty());

    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents[0]["paw"], "paw-a");
    assert_eq!(agents[0]["alive"], true);
    assert_eq!(agents[0]["wazuh_matched"], true);
    assert_eq!(agents[0]["wazuh_agent"]["id"], "001");
    let detections = agents[0]["recent_detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0]["technique_id"], "T1053");
    assert_eq!(detections[1]["technique_id"], "T1059");

    assert_eq!(agents[1]["paw"], "paw-b");
    assert_eq!(agents[1]["alive"], false);
    assert_eq!(agents[1]["wazuh_matched"], false);
    assert!(agents[1]["recent_detections"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_agents_plugin_alias() {
    let lab = lab_with_agents().await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/plugin/bastion/agents")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_agents"], 2);
}

#[tokio::test]
async fn test_agents_with_manager_down() {
    let lab = lab_with_agents().await;
    lab.manager.set_behavior(down()).await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/agents")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agents"][0]["wazuh_matched"], false);
    assert_eq!(body["agents"][0]["recent_detections"].as_array().unwrap().len(), 2);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("manager:"));
}

#[tokio::test]
async fn test_agents_with_caldera_down() {
    let lab = lab_with_agents().await;
    lab.caldera.set_behavior(down()).await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/agents")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_recent_alerts_by_level() {
    let lab = create_test_lab().await;

    let (status, body): (StatusCode, Value) = send_request(
        lab.app.clone(),
        get_request("/api/alerts?hours=1&min_level=7"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["alerts"][0]["id"], "w2");
    assert_eq!(
        body["detected_techniques"],
        serde_json::json!(["T1053", "T1059"])
    );

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/alerts?min_level=11")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert!(body["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_alerts_with_indexer_down() {
    let lab = create_test_lab().await;
    lab.indexer.set_behavior(down()).await;

    let (status, body): (StatusCode, Value) =
        send_request(lab.app, get_request("/api/alerts")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "INDEX_UNAVAILABLE");
}
