//! Dashboard summary builder.

use crate::correlation::{ratio, CorrelationResult};
use crate::coverage::{merge_tactic_coverage, CoverageReport, TacticCoverage};
use crate::model::{Alert, OperationMeta};
use crate::time::minute_bucket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Headline figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub operations: usize,
    pub agents: usize,
    pub attack_steps: usize,
    pub detections: usize,
    pub alerts_total: usize,
    pub detection_rate: f64,
    pub techniques_total: usize,
    pub techniques_detected: usize,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One operation in the summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    pub id: String,
    pub name: String,
    pub state: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub attack_steps: usize,
    pub detected_steps: usize,
    pub detection_rate: f64,
    pub total_alerts: usize,
}

/// Alert count for one UTC minute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub minute: String,
    pub alerts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub success: bool,
    pub generated_at: DateTime<Utc>,
    /// The first operation, when there is one.
    pub operation: Option<OperationMeta>,
    pub kpi: Kpi,
    /// Coverage report of the first operation.
    pub coverage: Option<CoverageReport>,
    pub operations: Vec<OperationRow>,
    pub tactic_coverage: Vec<TacticCoverage>,
    pub timeline: Vec<TimelinePoint>,
    /// Degraded lookups and skipped operations, prefixed with the operation id.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Alerts that stand for detections: representatives, or the raw alerts of
/// a result built without a step mapping.
fn evidence(correlation: &CorrelationResult) -> Vec<&Alert> {
    if correlation.steps.is_empty() {
        correlation.unmapped_alerts.iter().collect()
    } else {
        correlation.representative_alerts()
    }
}

/// Builds the dashboard snapshot. Empty input yields zero KPIs.
///
/// `coverage_errors` belong to the first correlation and are carried by its
/// coverage report.
pub fn build_summary(
    operations: &[OperationMeta],
    correlations: &[CorrelationResult],
    coverage_errors: Vec<String>,
    errors: Vec<String>,
) -> DashboardSummary {
    let mut agents = BTreeSet::new();
    let mut techniques_total = BTreeSet::new();
    let mut techniques_detected = BTreeSet::new();
    let mut timeline: BTreeMap<String, usize> = BTreeMap::new();
    let mut last_seen: Option<DateTime<Utc>> = None;
    let mut attack_steps = 0;
    let mut detections = 0;
    let mut alerts_total = 0;

    for correlation in correlations {
        attack_steps += correlation.eligible_steps;
        detections += correlation.detected_steps;
        alerts_total += correlation.total_alerts;
        techniques_total.extend(correlation.all_operation_techniques.iter().cloned());
        techniques_detected.extend(correlation.detected_techniques.iter().cloned());

        for alert in evidence(correlation) {
            if let Some(label) = alert.agent.label() {
                agents.insert(label.to_string());
            }
            *timeline.entry(minute_bucket(alert.timestamp)).or_insert(0) += 1;
            last_seen = last_seen.max(Some(alert.timestamp));
        }
    }

    let rows = operations
        .iter()
        .map(|op| {
            let correlation = correlations
                .iter()
                .find(|c| c.operation.as_ref().map(|o| o.id.as_str()) == Some(op.id.as_str()));
            OperationRow {
                id: op.id.clone(),
                name: op.name.clone(),
                state: op.state.clone(),
                start: op.start,
                end: op.end,
                attack_steps: correlation.map_or(0, |c| c.eligible_steps),
                detected_steps: correlation.map_or(0, |c| c.detected_steps),
                detection_rate: correlation.map_or(0.0, |c| c.detection_rate),
                total_alerts: correlation.map_or(0, |c| c.total_alerts),
            }
        })
        .collect();

    DashboardSummary {
        success: true,
        generated_at: Utc::now(),
        operation: operations.first().cloned(),
        kpi: Kpi {
            operations: operations.len(),
            agents: agents.len(),
            attack_steps,
            detections,
            alerts_total,
            detection_rate: ratio(detections, attack_steps),
            techniques_total: techniques_total.len(),
            techniques_detected: techniques_detected.len(),
            last_seen,
        },
        coverage: correlations
            .first()
            .map(|c| CoverageReport::new(c, coverage_errors)),
        operations: rows,
        tactic_coverage: merge_tactic_coverage(correlations),
        timeline: timeline
            .into_iter()
            .map(|(minute, alerts)| TimelinePoint { minute, alerts })
            .collect(),
        errors,
    }
}
