//! Correlation engine.
//!
//! Matches each eligible attack step against alerts raised between
//! `executed_at - clock_skew` and `executed_at + window`. An alert is a
//! candidate when one of its techniques is in the step's technique family,
//! or, for alerts without any technique, when its agent is the step's agent.
//! The closest candidate becomes the step's representative alert.

use crate::error::{CoreError, CoreResult};
use crate::model::{Alert, AttackStep, OperationMeta};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};

/// Default tolerance for agents whose clocks run ahead of the indexer.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 5;

/// Largest accepted match window (7 days).
pub const MAX_WINDOW_SECS: i64 = 7 * 24 * 3600;

const TECHNIQUE_CONFIDENCE: f64 = 0.5;
const AGENT_CONFIDENCE: f64 = 0.3;
const PID_BONUS: f64 = 0.4;
const PPID_BONUS: f64 = 0.3;

/// Matching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// How long after a step an alert may still be attributed to it.
    pub window: Duration,
    /// How long before a step an alert may be attributed to it.
    pub clock_skew: Duration,
}

impl CorrelationConfig {
    /// Windows beyond [`MAX_WINDOW_SECS`] in either direction are clamped.
    pub fn new(window_secs: i64) -> Self {
        Self {
            window: bounded_seconds(window_secs.clamp(-MAX_WINDOW_SECS, MAX_WINDOW_SECS)),
            clock_skew: bounded_seconds(DEFAULT_CLOCK_SKEW_SECS),
        }
    }

    pub fn with_clock_skew(mut self, skew_secs: i64) -> Self {
        self.clock_skew = bounded_seconds(skew_secs.clamp(0, MAX_WINDOW_SECS));
        self
    }
}

fn bounded_seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or_else(Duration::zero)
}

/// How a representative alert was tied to its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Technique,
    Agent,
}

/// Outcome for one attack step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCorrelation {
    pub step: AttackStep,
    pub eligible: bool,
    pub detected: bool,
    /// Representative alert, if any.
    pub matched_alert: Option<Alert>,
    /// Number of candidate alerts.
    pub match_count: usize,
    pub match_kind: Option<MatchKind>,
    /// Alert time minus execution time, in milliseconds.
    pub delta_ms: Option<i64>,
    pub confidence: f64,
}

impl StepCorrelation {
    fn undetected(step: AttackStep) -> Self {
        Self {
            eligible: step.is_eligible(),
            step,
            detected: false,
            matched_alert: None,
            match_count: 0,
            match_kind: None,
            delta_ms: None,
            confidence: 0.0,
        }
    }
}

/// Correlation of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub operation: Option<OperationMeta>,
    pub window_secs: i64,
    pub steps: Vec<StepCorrelation>,
    pub eligible_steps: usize,
    pub detected_steps: usize,
    /// `detected_steps / eligible_steps`, 0 when nothing is eligible.
    pub detection_rate: f64,
    pub all_operation_techniques: Vec<String>,
    pub detected_techniques: Vec<String>,
    /// Distinct representative alerts, or distinct technique groups when
    /// built from alerts alone.
    pub total_alerts: usize,
    /// Candidate alerts summed over all steps.
    pub total_matches: usize,
    pub alerts_scanned: usize,
    /// Alerts kept when no step mapping is available.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmapped_alerts: Vec<Alert>,
}

impl CorrelationResult {
    /// A result with no steps and no alerts.
    pub fn empty(operation: Option<OperationMeta>, window_secs: i64) -> Self {
        Self {
            operation,
            window_secs,
            steps: Vec::new(),
            eligible_steps: 0,
            detected_steps: 0,
            detection_rate: 0.0,
            all_operation_techniques: Vec::new(),
            detected_techniques: Vec::new(),
            total_alerts: 0,
            total_matches: 0,
            alerts_scanned: 0,
            unmapped_alerts: Vec::new(),
        }
    }

    /// Builds a result when the step chain is unavailable: nothing is
    /// eligible and `total_alerts` counts distinct technique groups.
    pub fn from_alerts_only(
        operation: Option<OperationMeta>,
        alerts: Vec<Alert>,
        window_secs: i64,
    ) -> Self {
        let groups: BTreeSet<Vec<String>> = alerts
            .iter()
            .filter(|a| a.has_techniques())
            .map(|a| a.mitre.technique_ids.clone())
            .collect();
        Self {
            total_alerts: groups.len(),
            alerts_scanned: alerts.len(),
            unmapped_alerts: alerts,
            ..Self::empty(operation, window_secs)
        }
    }

    pub fn with_operation(mut self, operation: OperationMeta) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Distinct representative alerts ordered by timestamp then id.
    pub fn representative_alerts(&self) -> Vec<&Alert> {
        let mut seen = HashSet::new();
        let mut alerts: Vec<&Alert> = self
            .steps
            .iter()
            .filter_map(|s| s.matched_alert.as_ref())
            .filter(|a| seen.insert(a.id.as_str()))
            .collect();
        alerts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    pub fn eligible(&self) -> impl Iterator<Item = &StepCorrelation> {
        self.steps.iter().filter(|s| s.eligible)
    }

    pub fn undetected_techniques(&self) -> Vec<String> {
        let detected: HashSet<&String> = self.detected_techniques.iter().collect();
        self.all_operation_techniques
            .iter()
            .filter(|t| !detected.contains(t))
            .cloned()
            .collect()
    }
}

/// Correlates `steps` with `alerts`.
pub fn correlate(
    steps: Vec<AttackStep>,
    alerts: &[Alert],
    config: &CorrelationConfig,
) -> CoreResult<CorrelationResult> {
    if config.window <= Duration::zero() {
        return Err(CoreError::InvalidWindow(format!(
            "window must be positive, got {}s",
            config.window.num_seconds()
        )));
    }

    let correlated: Vec<StepCorrelation> = steps
        .into_iter()
        .map(|step| correlate_step(step, alerts, config))
        .collect();

    let eligible_steps = correlated.iter().filter(|s| s.eligible).count();
    let detected_steps = correlated.iter().filter(|s| s.detected).count();
    let techniques = |detected_only: bool| -> Vec<String> {
        correlated
            .iter()
            .filter(|s| s.eligible && (s.detected || !detected_only))
            .filter_map(|s| s.step.technique_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };
    let all_operation_techniques = techniques(false);
    let detected_techniques = techniques(true);
    let total_matches = correlated.iter().map(|s| s.match_count).sum();

    let mut result = CorrelationResult {
        all_operation_techniques,
        detected_techniques,
        eligible_steps,
        detected_steps,
        detection_rate: ratio(detected_steps, eligible_steps),
        total_matches,
        alerts_scanned: alerts.len(),
        steps: correlated,
        ..CorrelationResult::empty(None, config.window.num_seconds())
    };
    result.total_alerts = result.representative_alerts().len();
    Ok(result)
}

fn correlate_step(
    step: AttackStep,
    alerts: &[Alert],
    config: &CorrelationConfig,
) -> StepCorrelation {
    let (Some(technique), Some(executed_at)) = (step.technique_id.clone(), step.executed_at)
    else {
        return StepCorrelation::undetected(step);
    };
    let earliest = executed_at
        .checked_sub_signed(config.clock_skew)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let latest = executed_at
        .checked_add_signed(config.window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let candidates: Vec<(&Alert, MatchKind)> = alerts
        .iter()
        .filter(|a| a.timestamp >= earliest && a.timestamp <= latest)
        .filter_map(|a| {
            if a.has_techniques() {
                a.matches_technique(&technique).then_some((a, MatchKind::Technique))
            } else {
                a.matches_agent(&step.agent_paw, step.host.as_deref())
                    .then_some((a, MatchKind::Agent))
            }
        })
        .collect();

    let key = |a: &Alert| {
        (
            (a.timestamp - executed_at).num_milliseconds().abs(),
            Reverse(a.rule_level),
        )
    };
    let best = candidates.iter().min_by(|x, y| {
        let (a, b) = (x.0, y.0);
        key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id))
    });

    let mut out = StepCorrelation::undetected(step);
    out.match_count = candidates.len();
    if let Some((alert, kind)) = best {
        out.confidence = confidence(&out.step, alert, *kind);
        out.delta_ms = Some((alert.timestamp - executed_at).num_milliseconds());
        out.match_kind = Some(*kind);
        out.matched_alert = Some((*alert).clone());
        out.detected = true;
    }
    out
}

fn confidence(step: &AttackStep, alert: &Alert, kind: MatchKind) -> f64 {
    let mut score = match kind {
        MatchKind::Technique => TECHNIQUE_CONFIDENCE,
        MatchKind::Agent => AGENT_CONFIDENCE,
    };
    if let Some(pid) = step.pid.as_deref() {
        if alert.pid.as_deref() == Some(pid) {
            score += PID_BONUS;
        }
        if alert.ppid.as_deref() == Some(pid) {
            score += PPID_BONUS;
        }
    }
    score.min(1.0)
}

/// `num / den`, 0 when `den` is 0.
pub fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_connectors::testing::sample_alert_document;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn step(id: &str, technique: Option<&str>, at: Option<i64>, paw: &str) -> AttackStep {
        AttackStep {
            link_id: id.into(),
            technique_id: technique.map(str::to_string),
            tactics: vec!["execution".into()],
            agent_paw: paw.into(),
            host: None,
            executed_at: at.map(t),
            started_at: None,
            ability_name: format!("ability {}", id),
            pid: None,
            command: None,
            status: Some(0),
        }
    }

    fn alert(id: &str, techniques: &[&str], at: i64, level: i64, agent: &str) -> Alert {
        Alert::from_document(&sample_alert_document(id, t(at), "100200", level, techniques, agent))
            .unwrap()
    }

    fn config() -> CorrelationConfig {
        CorrelationConfig::new(60)
    }

    #[test]
    fn test_half_detected_operation() {
        let steps = vec![
            step("l1", Some("T1059"), Some(100), "A"),
            step("l2", Some("T1053"), Some(200), "A"),
            step("l3", Some("T1021"), None, "B"),
        ];
        let alerts = vec![
            alert("a1", &["T1059"], 105, 5, "A"),
            alert("a2", &["T1053"], 400, 5, "A"),
        ];
        let result = correlate(steps, &alerts, &config()).unwrap();
        assert_eq!(result.eligible_steps, 2);
        assert_eq!(result.detected_steps, 1);
        assert_eq!(result.detection_rate, 0.5);
        assert_eq!(result.all_operation_techniques, vec!["T1053", "T1059"]);
        assert_eq!(result.detected_techniques, vec!["T1059"]);
        assert_eq!(result.undetected_techniques(), vec!["T1053"]);
        assert_eq!(result.total_alerts, 1);
        assert!(!result.steps[2].eligible);
    }

    #[test]
    fn test_no_alerts() {
        let steps: Vec<_> = ["T1001", "T1002", "T1003", "T1004", "T1004"]
            .iter()
            .enumerate()
            .map(|(i, tech)| step(&format!("l{}", i), Some(*tech), Some(i as i64 * 10), "A"))
            .collect();
        let result = correlate(steps, &[], &config()).unwrap();
        assert_eq!(result.eligible_steps, 5);
        assert_eq!(result.detection_rate, 0.0);
        assert_eq!(result.all_operation_techniques.len(), 4);
        assert_eq!(result.total_alerts, 0);
    }

    #[test]
    fn test_no_eligible_steps() {
        let result = correlate(vec![step("l1", None, Some(0), "A")], &[], &config()).unwrap();
        assert_eq!(result.eligible_steps, 0);
        assert_eq!(result.detection_rate, 0.0);
    }

    #[test]
    fn test_invalid_window() {
        for secs in [0, -5] {
            let err = correlate(vec![], &[], &CorrelationConfig::new(secs)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidWindow(_)));
        }
    }

    #[test]
    fn test_window_bounds_and_clock_skew() {
        let steps = vec![step("l1", Some("T1059"), Some(100), "A")];
        let early = [alert("a1", &["T1059"], 96, 5, "A")];
        assert!(correlate(steps.clone(), &early, &config()).unwrap().steps[0].detected);

        let too_early = [alert("a1", &["T1059"], 94, 5, "A")];
        assert!(!correlate(steps.clone(), &too_early, &config()).unwrap().steps[0].detected);

        let edge = [alert("a1", &["T1059"], 160, 5, "A")];
        assert!(correlate(steps.clone(), &edge, &config()).unwrap().steps[0].detected);

        let no_skew = config().with_clock_skew(0);
        assert!(!correlate(steps, &early, &no_skew).unwrap().steps[0].detected);
    }

    #[test]
    fn test_tie_break_prefers_closest_then_level_then_id() {
        let steps = vec![step("l1", Some("T1059"), Some(100), "A")];
        let alerts = vec![
            alert("far", &["T1059"], 130, 15, "A"),
            alert("low", &["T1059"], 110, 3, "A"),
            alert("high", &["T1059"], 90, 12, "A"),
            alert("b-high", &["T1059"], 110, 12, "A"),
            alert("a-high", &["T1059"], 110, 12, "A"),
        ];
        // "high" at t=90 sits outside the 5s skew.
        let result = correlate(steps.clone(), &alerts, &config()).unwrap();
        let chosen = result.steps[0].matched_alert.as_ref().unwrap();
        assert_eq!(chosen.id, "a-high");
        assert_eq!(result.steps[0].match_count, 4);
        assert_eq!(result.steps[0].delta_ms, Some(10_000));

        let mut reversed = alerts.clone();
        reversed.reverse();
        let again = correlate(steps, &reversed, &config()).unwrap();
        assert_eq!(again, result);
    }

    #[test]
    fn test_one_alert_covers_repeated_technique() {
        let steps = vec![
            step("l1", Some("T1082"), Some(100), "A"),
            step("l2", Some("T1082"), Some(110), "A"),
        ];
        let alerts = vec![alert("a1", &["T1082"], 112, 5, "A")];
        let result = correlate(steps, &alerts, &config()).unwrap();
        assert_eq!(result.detected_steps, 2);
        assert_eq!(result.total_alerts, 1);
        assert_eq!(result.total_matches, 2);
        assert_eq!(result.representative_alerts().len(), 1);
    }

    #[test]
    fn test_agent_fallback_only_for_untagged_alerts() {
        let mut s = step("l1", Some("T1105"), Some(100), "paw-a");
        s.host = Some("web-01".into());
        let untagged = Alert::from_document(&sample_alert_document(
            "u1", t(102), "100999", 4, &[], "WEB-01",
        ))
        .unwrap();
        let result = correlate(vec![s.clone()], &[untagged], &config()).unwrap();
        assert_eq!(result.steps[0].match_kind, Some(MatchKind::Agent));
        assert_eq!(result.steps[0].confidence, 0.3);

        let tagged_other = alert("t1", &["T1003"], 102, 4, "web-01");
        let result = correlate(vec![s], &[tagged_other], &config()).unwrap();
        assert!(!result.steps[0].detected);
    }

    #[test]
    fn test_sub_technique_family_and_rule_map() {
        let steps = vec![
            step("l1", Some("T1059.001"), Some(100), "A"),
            step("l2", Some("T1078"), Some(200), "A"),
        ];
        let parent = alert("a1", &["T1059"], 101, 5, "A");
        let mapped = Alert::from_document(&sample_alert_document(
            "a2", t(201), "5715", 3, &[], "other",
        ))
        .unwrap();
        let result = correlate(steps, &[parent, mapped], &config()).unwrap();
        assert_eq!(result.detected_steps, 2);
        assert_eq!(result.steps[1].match_kind, Some(MatchKind::Technique));
    }

    #[test]
    fn test_pid_raises_confidence() {
        let mut s = step("l1", Some("T1059"), Some(100), "A");
        s.pid = Some("4242".into());
        let mut a = alert("a1", &["T1059"], 101, 5, "A");
        a.pid = Some("4242".into());
        let result = correlate(vec![s.clone()], &[a.clone()], &config()).unwrap();
        assert!((result.steps[0].confidence - 0.9).abs() < 1e-9);

        a.ppid = Some("4242".into());
        let result = correlate(vec![s], &[a], &config()).unwrap();
        assert_eq!(result.steps[0].confidence, 1.0);
    }

    #[test]
    fn test_rate_bounds_and_monotonic_techniques() {
        let mut steps = Vec::new();
        let mut previous = 0;
        for i in 0..12 {
            let technique = format!("T10{:02}", i % 7);
            steps.push(step(&format!("l{}", i), Some(technique.as_str()), Some(i * 30), "A"));
            let alerts = vec![alert("a", &["T1000"], 0, 5, "A")];
            let result = correlate(steps.clone(), &alerts, &config()).unwrap();
            assert!((0.0..=1.0).contains(&result.detection_rate));
            assert!(result.all_operation_techniques.len() >= previous);
            previous = result.all_operation_techniques.len();
        }
    }

    #[test]
    fn test_from_alerts_only_counts_technique_groups() {
        let alerts = vec![
            alert("a1", &["T1059"], 0, 5, "A"),
            alert("a2", &["T1059"], 10, 5, "A"),
            alert("a3", &["T1082", "T1083"], 20, 5, "A"),
            Alert::from_document(&sample_alert_document("a4", t(30), "1", 2, &[], "A")).unwrap(),
        ];
        let result = CorrelationResult::from_alerts_only(None, alerts, 60);
        assert_eq!(result.total_alerts, 2);
        assert_eq!(result.alerts_scanned, 4);
        assert_eq!(result.eligible_steps, 0);
        assert_eq!(result.detection_rate, 0.0);
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let config = CorrelationConfig::new(i64::MAX).with_clock_skew(i64::MAX);
        assert_eq!(config.window, Duration::seconds(MAX_WINDOW_SECS));
        assert_eq!(config.clock_skew, Duration::seconds(MAX_WINDOW_SECS));
        assert_eq!(CorrelationConfig::new(i64::MIN).window, Duration::seconds(-MAX_WINDOW_SECS));

        let result = correlate(
            vec![step("l1", Some("T1059"), Some(100), "A")],
            &[alert("a1", &["T1059"], 5_000, 5, "A")],
            &config,
        )
        .unwrap();
        assert_eq!(result.detected_steps, 1);
    }

    #[test]
    fn test_step_at_end_of_time_does_not_overflow() {
        let mut s = step("l1", Some("T1059"), None, "A");
        s.executed_at = Some(DateTime::<Utc>::MAX_UTC);
        let result = correlate(vec![s], &[alert("a1", &["T1059"], 0, 5, "A")], &config()).unwrap();
        assert_eq!(result.eligible_steps, 1);
        assert_eq!(result.detected_steps, 0);
    }
}
