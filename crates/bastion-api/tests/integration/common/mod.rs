//! Common test utilities for integration tests.

use axum::{
    body::Body,
    http::{Method, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

use bastion_api::{ApiServer, AppState};
use bastion_connectors::testing::{sample_alert_document, sample_link, sample_operation};
use bastion_connectors::{MockCalderaConnector, MockIndexerConnector, MockManagerConnector};
use bastion_core::{ChainCache, ChainLoader, CoverageService, EventStore};

/// Mock lab behind a router.
///
/// Operation `op-1` started 20 minutes ago and ran T1059 (+100 s) and T1053
/// (+200 s) on `agent-a`. The indexer holds a T1059 alert 5 s after its step
/// and a T1053 alert 200 s after its step.
pub struct TestLab {
    pub app: Router,
    pub indexer: Arc<MockIndexerConnector>,
    pub caldera: Arc<MockCalderaConnector>,
    pub manager: Arc<MockManagerConnector>,
    pub start: DateTime<Utc>,
}

pub async fn create_test_lab() -> TestLab {
    let start = Utc::now() - Duration::minutes(20);
    let at = |secs: i64| start + Duration::seconds(secs);

    let caldera = Arc::new(MockCalderaConnector::new());
    caldera
        .add_operation(sample_operation(
            "op-1",
            start,
            vec![
                sample_link("l1", Some("T1059"), Some(at(100)), "agent-a"),
                sample_link("l2", Some("T1053"), Some(at(200)), "agent-a"),
            ],
        ))
        .await;

    let indexer = Arc::new(MockIndexerConnector::new("indexer"));
    indexer
        .add_documents(vec![
            sample_alert_document("w1", at(105), "92000", 10, &["T1059"], "agent-a"),
            sample_alert_document("w2", at(400), "92100", 10, &["T1053"], "agent-a"),
        ])
        .await;

    let manager = Arc::new(MockManagerConnector::new("manager"));

    let service = CoverageService::new(
        EventStore::new(indexer.clone()),
        ChainLoader::new(caldera.clone()),
        ChainCache::default(),
    );
    let state = AppState::new(service, manager.clone());
    let app = ApiServer::with_state(state).router();

    TestLab {
        app,
        indexer,
        caldera,
        manager,
        start,
    }
}

/// Helper to make GET requests.
pub fn get_request(uri: &str) -> axum::extract::Request<Body> {
    axum::extract::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to make POST requests with JSON body.
pub fn post_json_request(uri: &str, body: &str) -> axum::extract::Request<Body> {
    axum::extract::Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Helper to make POST requests without a body.
pub fn post_empty_request(uri: &str) -> axum::extract::Request<Body> {
    axum::extract::Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Sends request and parses JSON response.
pub async fn send_request<T: DeserializeOwned>(
    app: Router,
    request: axum::extract::Request<Body>,
) -> (StatusCode, T) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: T = serde_json::from_slice(&body).unwrap_or_else(|e| {
        panic!(
            "Failed to parse response: {} - Body: {:?}",
            e,
            String::from_utf8_lossy(&body)
        )
    });
    (status, parsed)
}

/// Sends request and returns raw response body.
pub async fn send_request_raw(
    app: Router,
    request: axum::extract::Request<Body>,
) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}
