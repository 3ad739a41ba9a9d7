//! End-to-end tests of the correlation pipeline over mock connectors.
//!
//! ```bash
//! cargo test --package bastion-core --test pipeline_tests
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use bastion_connectors::testing::{sample_alert_document, sample_link, sample_operation};
use bastion_connectors::{
    ConnectorError, MockBehavior, MockCalderaConnector, MockIndexerConnector,
};
use bastion_core::{
    aggregate_by_tactic, agent_detections, ChainCache, ChainLoader, CoreError,
    CorrelationRequest, CoverageService, EventStore, MAX_WINDOW_SECS,
};

// ============================================================================
// Harness
// ============================================================================

struct Lab {
    service: CoverageService,
    indexer: Arc<MockIndexerConnector>,
    start: DateTime<Utc>,
}

/// Operation `op-1`: T1059 and T1053 on agent A, then T1021 on agent B that
/// never reported an execution time. Only T1059 is alerted in time.
async fn lab() -> Lab {
    let start = Utc::now() - Duration::minutes(20);
    let at = |secs: i64| start + Duration::seconds(secs);

    let caldera = Arc::new(MockCalderaConnector::new());
    let mut lateral = sample_link("l3", Some("T1021"), None, "agent-b");
    lateral.ability.tactic = Some("lateral-movement".into());
    caldera
        .add_operation(sample_operation(
            "op-1",
            start,
            vec![
                sample_link("l1", Some("T1059"), Some(at(100)), "agent-a"),
                sample_link("l2", Some("T1053"), Some(at(200)), "agent-a"),
                lateral,
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

    let service = CoverageService::new(
        EventStore::new(indexer.clone()),
        ChainLoader::new(caldera),
        ChainCache::default(),
    );
    Lab {
        service,
        indexer,
        start,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn half_of_eligible_steps_are_detected() {
    let lab = lab().await;
    let outcome = lab
        .service
        .correlate_operation(CorrelationRequest::for_operation("op-1"))
        .await
        .unwrap();
    let result = &outcome.result;

    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.eligible_steps, 2);
    assert_eq!(result.detected_steps, 1);
    assert_eq!(result.detection_rate, 0.5);
    assert_eq!(result.total_alerts, 1);
    assert_eq!(result.operation.as_ref().unwrap().start, Some(lab.start));

    let tactics = aggregate_by_tactic(result);
    assert_eq!(tactics.len(), 1);
    assert_eq!(tactics[0].tactic, "execution");
    assert_eq!(tactics[0].executed_technique_count, 2);
    assert_eq!(tactics[0].detected_technique_count, 1);

    assert_eq!(agent_detections(result).get("agent-a"), Some(&1));
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let lab = lab().await;
    let first = lab
        .service
        .correlate_operation(CorrelationRequest::for_operation("op-1"))
        .await
        .unwrap();
    let second = lab
        .service
        .correlate_operation(CorrelationRequest::for_operation("op-1"))
        .await
        .unwrap();
    assert_eq!(first.result.steps, second.result.steps);
}

#[tokio::test]
async fn wider_window_catches_late_alert() {
    let lab = lab().await;
    let outcome = lab
        .service
        .correlate_operation(CorrelationRequest {
            window_secs: Some(300),
            ..CorrelationRequest::for_operation("op-1")
        })
        .await
        .unwrap();
    assert_eq!(outcome.result.detected_steps, 2);
    assert_eq!(outcome.result.detection_rate, 1.0);
}

#[tokio::test]
async fn report_and_summary_agree() {
    let lab = lab().await;
    let outcome = lab
        .service
        .correlate_operation(CorrelationRequest::for_operation("op-1"))
        .await
        .unwrap();
    let report = outcome.report();
    assert_eq!(report.correlation.undetected_techniques_list, vec!["T1053"]);

    let summary = lab
        .service
        .dashboard_summary(vec![CorrelationRequest::for_operation("op-1")], None, None)
        .await
        .unwrap();
    assert_eq!(summary.kpi.detection_rate, report.correlation.detection_rate);
    assert_eq!(summary.kpi.attack_steps, report.attack_steps);
    assert_eq!(summary.kpi.agents, 1);
}

#[tokio::test]
async fn summary_surfaces_indexer_outage() {
    let lab = lab().await;
    lab.indexer
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed(
            "connection refused".into(),
        )))
        .await;

    let summary = lab
        .service
        .dashboard_summary(vec![CorrelationRequest::for_operation("op-1")], None, None)
        .await
        .unwrap();
    assert_eq!(summary.kpi.attack_steps, 2);
    assert_eq!(summary.kpi.detections, 0);

    let coverage = summary.coverage.as_ref().unwrap();
    assert_eq!(coverage.errors.len(), 1);
    assert!(coverage.errors[0].contains("connection refused"));
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("op-1: indexer:"));
}

#[tokio::test]
async fn summary_over_several_operations_skips_the_failed_one() {
    let lab = lab().await;
    let summary = lab
        .service
        .dashboard_summary(
            vec![
                CorrelationRequest::for_operation("op-1"),
                CorrelationRequest::for_operation("op-gone"),
            ],
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(summary.kpi.operations, 1);
    assert_eq!(summary.operations[0].id, "op-1");
    assert_eq!(summary.kpi.detections, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("op-gone: skipped:"));
    assert!(summary.coverage.unwrap().errors.is_empty());
}

#[tokio::test]
async fn single_failed_operation_fails_the_summary() {
    let lab = lab().await;
    let err = lab
        .service
        .dashboard_summary(vec![CorrelationRequest::for_operation("op-gone")], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::OperationNotFound(_)));
}

#[tokio::test]
async fn window_is_bounded_to_seven_days() {
    let lab = lab().await;
    let widest = lab
        .service
        .correlate_operation(CorrelationRequest {
            window_secs: Some(MAX_WINDOW_SECS),
            ..CorrelationRequest::for_operation("op-1")
        })
        .await
        .unwrap();
    assert_eq!(widest.result.detected_steps, 2);

    for window in [MAX_WINDOW_SECS + 1, i64::MAX] {
        let err = lab
            .service
            .correlate_operation(CorrelationRequest {
                window_secs: Some(window),
                ..CorrelationRequest::for_operation("op-1")
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_WINDOW");
    }
}

#[tokio::test]
async fn start_without_window_returns_full_chain() {
    let lab = lab().await;
    let windowed = lab.service.start_operation("op-1", Some(60)).await.unwrap();
    assert!(windowed.chain.steps.is_empty());

    let started = lab.service.start_operation("op-1", None).await.unwrap();
    assert!(!started.cached);
    assert_eq!(started.chain.steps.len(), 3);
}
