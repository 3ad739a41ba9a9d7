//! Coverage aggregation and the report views derived from a correlation.

use crate::correlation::{ratio, CorrelationResult, MatchKind, StepCorrelation};
use crate::mitre::tactic_id;
use crate::model::Alert;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Bucket for steps that carry no tactic at all.
pub const UNCLASSIFIED_TACTIC: &str = "unclassified";

/// Coverage of one ATT&CK tactic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticCoverage {
    pub tactic: String,
    pub tactic_id: Option<String>,
    pub executed_technique_count: usize,
    pub detected_technique_count: usize,
    pub coverage: f64,
    pub executed_techniques: Vec<String>,
    pub detected_techniques: Vec<String>,
}

/// Per-technique step counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueCoverage {
    pub technique_id: String,
    pub executed_steps: usize,
    pub detected_steps: usize,
    pub detected: bool,
}

#[derive(Default)]
struct Bucket {
    executed: BTreeSet<String>,
    detected: BTreeSet<String>,
}

/// Groups eligible steps by tactic, ordered by tactic name.
///
/// A step counts towards its own tactics and those of its representative
/// alert, so bucket totals can exceed the number of distinct techniques.
pub fn aggregate_by_tactic(correlation: &CorrelationResult) -> Vec<TacticCoverage> {
    aggregate_steps(correlation.eligible())
}

/// Same as [`aggregate_by_tactic`] over several correlations.
pub fn merge_tactic_coverage(correlations: &[CorrelationResult]) -> Vec<TacticCoverage> {
    aggregate_steps(correlations.iter().flat_map(|c| c.eligible()))
}

fn aggregate_steps<'a>(steps: impl Iterator<Item = &'a StepCorrelation>) -> Vec<TacticCoverage> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

    for sc in steps {
        let Some(technique) = sc.step.technique_id.as_ref() else {
            continue;
        };
        let mut tactics: BTreeSet<&str> = sc.step.tactics.iter().map(String::as_str).collect();
        if let Some(alert) = &sc.matched_alert {
            tactics.extend(alert.mitre.tactics.iter().map(String::as_str));
        }
        if tactics.is_empty() {
            tactics.insert(UNCLASSIFIED_TACTIC);
        }

        for tactic in tactics {
            let bucket = buckets.entry(tactic.to_string()).or_default();
            bucket.executed.insert(technique.clone());
            if sc.detected {
                bucket.detected.insert(technique.clone());
            }
        }
    }

    buckets
        .into_iter()
        .map(|(tactic, bucket)| TacticCoverage {
            tactic_id: tactic_id(&tactic).map(str::to_string),
            executed_technique_count: bucket.executed.len(),
            detected_technique_count: bucket.detected.len(),
            coverage: ratio(bucket.detected.len(), bucket.executed.len()),
            executed_techniques: bucket.executed.into_iter().collect(),
            detected_techniques: bucket.detected.into_iter().collect(),
            tactic,
        })
        .collect()
}

/// Detected step counts keyed by the representative alert's agent name,
/// falling back to the agent id.
pub fn agent_detections(correlation: &CorrelationResult) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for sc in correlation.steps.iter().filter(|s| s.detected) {
        if let Some(label) = sc.matched_alert.as_ref().and_then(|a| a.agent.label()) {
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Step counts per executed technique, ordered by technique id.
pub fn technique_breakdown(correlation: &CorrelationResult) -> Vec<TechniqueCoverage> {
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for sc in correlation.eligible() {
        if let Some(technique) = sc.step.technique_id.as_deref() {
            let entry = counts.entry(technique).or_default();
            entry.0 += 1;
            if sc.detected {
                entry.1 += 1;
            }
        }
    }
    counts
        .into_iter()
        .map(|(technique, (executed, detected))| TechniqueCoverage {
            technique_id: technique.to_string(),
            executed_steps: executed,
            detected_steps: detected,
            detected: detected > 0,
        })
        .collect()
}

/// Compact alert view used in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: String,
    pub index: String,
    pub timestamp: DateTime<Utc>,
    pub rule_id: Option<String>,
    pub rule_level: i64,
    pub rule_description: Option<String>,
    pub agent: Option<String>,
    pub technique_ids: Vec<String>,
    pub tactics: Vec<String>,
}

impl From<&Alert> for AlertSummary {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            index: alert.index.clone(),
            timestamp: alert.timestamp,
            rule_id: alert.rule_id.clone(),
            rule_level: alert.rule_level,
            rule_description: alert.rule_description.clone(),
            agent: alert.agent.label().map(str::to_string),
            technique_ids: alert.mitre.technique_ids.clone(),
            tactics: alert.mitre.tactics.clone(),
        }
    }
}

/// One step row of a coverage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub link_id: String,
    pub ability_name: String,
    pub technique_id: Option<String>,
    pub tactics: Vec<String>,
    pub agent_paw: String,
    pub host: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub eligible: bool,
    pub detected: bool,
    pub match_count: usize,
    pub match_kind: Option<MatchKind>,
    pub delta_ms: Option<i64>,
    pub confidence: f64,
    pub alert: Option<AlertSummary>,
}

impl From<&StepCorrelation> for StepView {
    fn from(sc: &StepCorrelation) -> Self {
        Self {
            link_id: sc.step.link_id.clone(),
            ability_name: sc.step.ability_name.clone(),
            technique_id: sc.step.technique_id.clone(),
            tactics: sc.step.tactics.clone(),
            agent_paw: sc.step.agent_paw.clone(),
            host: sc.step.host.clone(),
            executed_at: sc.step.executed_at,
            eligible: sc.eligible,
            detected: sc.detected,
            match_count: sc.match_count,
            match_kind: sc.match_kind,
            delta_ms: sc.delta_ms,
            confidence: sc.confidence,
            alert: sc.matched_alert.as_ref().map(AlertSummary::from),
        }
    }
}

/// Technique-level figures of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub detection_rate: f64,
    pub total_techniques: usize,
    pub detected_techniques: usize,
    pub all_operation_techniques: Vec<String>,
    pub all_detected_techniques: Vec<String>,
    pub matched_techniques: Vec<TechniqueCoverage>,
    pub undetected_techniques: usize,
    pub undetected_techniques_list: Vec<String>,
}

/// Coverage report for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub success: bool,
    pub operation_id: Option<String>,
    pub operation_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub time_window_sec: i64,
    pub attack_steps: usize,
    pub total_steps: usize,
    pub detected_steps: usize,
    pub total_alerts: usize,
    pub total_matches: usize,
    pub alerts_scanned: usize,
    pub correlation: CorrelationStats,
    pub steps: Vec<StepView>,
    pub alerts_matched: Vec<AlertSummary>,
    pub tactic_coverage: Vec<TacticCoverage>,
    pub agents: BTreeMap<String, usize>,
    pub errors: Vec<String>,
}

impl CoverageReport {
    pub fn new(correlation: &CorrelationResult, errors: Vec<String>) -> Self {
        let operation = correlation.operation.as_ref();
        let start_time = operation.and_then(|o| o.start);
        let end_time = operation.and_then(|o| o.end);
        let duration_seconds = start_time
            .zip(end_time)
            .map(|(start, end)| (end - start).num_seconds());

        let breakdown = technique_breakdown(correlation);
        let undetected = correlation.undetected_techniques();
        let alerts_matched = if correlation.steps.is_empty() {
            correlation.unmapped_alerts.iter().map(AlertSummary::from).collect()
        } else {
            correlation
                .representative_alerts()
                .into_iter()
                .map(AlertSummary::from)
                .collect()
        };

        Self {
            success: true,
            operation_id: operation.map(|o| o.id.clone()),
            operation_name: operation.map(|o| o.name.clone()),
            start_time,
            end_time,
            duration_seconds,
            time_window_sec: correlation.window_secs,
            attack_steps: correlation.eligible_steps,
            total_steps: correlation.steps.len(),
            detected_steps: correlation.detected_steps,
            total_alerts: correlation.total_alerts,
            total_matches: correlation.total_matches,
            alerts_scanned: correlation.alerts_scanned,
            correlation: CorrelationStats {
                detection_rate: correlation.detection_rate,
                total_techniques: correlation.all_operation_techniques.len(),
                detected_techniques: correlation.detected_techniques.len(),
                all_operation_techniques: correlation.all_operation_techniques.clone(),
                all_detected_techniques: correlation.detected_techniques.clone(),
                matched_techniques: breakdown.into_iter().filter(|t| t.detected).collect(),
                undetected_techniques: undetected.len(),
                undetected_techniques_list: undetected,
            },
            steps: correlation.steps.iter().map(StepView::from).collect(),
            alerts_matched,
            tactic_coverage: aggregate_by_tactic(correlation),
            agents: agent_detections(correlation),
            errors,
        }
    }
}

/// Per-step detection row used by the detections and export endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRow {
    pub link_id: String,
    pub ability_name: String,
    pub technique_id: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub detected: bool,
    pub match_count: usize,
    pub confidence: f64,
    pub matches: Vec<AlertSummary>,
}

pub fn detection_rows(correlation: &CorrelationResult) -> Vec<DetectionRow> {
    correlation
        .steps
        .iter()
        .map(|sc| DetectionRow {
            link_id: sc.step.link_id.clone(),
            ability_name: sc.step.ability_name.clone(),
            technique_id: sc.step.technique_id.clone(),
            executed_at: sc.step.executed_at,
            detected: sc.detected,
            match_count: sc.match_count,
            confidence: sc.confidence,
            matches: sc.matched_alert.iter().map(AlertSummary::from).collect(),
        })
        .collect()
}
