//! Askama template definitions for the plugin results page.

use askama::Template;
use bastion_core::{DetectionReport, DetectionRow, OperationMeta};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Template)]
#[template(path = "plugin_gui.html")]
pub struct PluginGuiTemplate {
    pub ops: Vec<OperationOption>,
    pub selected_op_id: Option<String>,
    pub results: Option<ResultsView>,
    pub time_window_sec: i64,
    pub error: Option<String>,
}

/// One entry of the operation selector.
#[derive(Clone)]
pub struct OperationOption {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

impl OperationOption {
    pub fn new(op: &OperationMeta, selected_id: Option<&str>) -> Self {
        let name = if op.name.is_empty() { &op.id } else { &op.name };
        let label = match op.start {
            Some(start) => format!("{} ({})", name, start.format(TIME_FORMAT)),
            None => name.clone(),
        };
        Self {
            id: op.id.clone(),
            label,
            selected: selected_id == Some(op.id.as_str()),
        }
    }
}

/// Correlation results of the selected operation.
pub struct ResultsView {
    pub operation_name: String,
    pub detected_steps: usize,
    pub eligible_steps: usize,
    pub detection_rate_pct: String,
    pub rows: Vec<ResultRow>,
    pub errors: Vec<String>,
}

impl From<DetectionReport> for ResultsView {
    fn from(report: DetectionReport) -> Self {
        let coverage = report.coverage;
        Self {
            operation_name: coverage
                .operation_name
                .filter(|n| !n.is_empty())
                .unwrap_or(report.operation_id),
            detected_steps: coverage.detected_steps,
            eligible_steps: coverage.attack_steps,
            detection_rate_pct: format!("{:.1}", coverage.correlation.detection_rate * 100.0),
            rows: report.results.iter().map(ResultRow::from).collect(),
            errors: coverage.errors,
        }
    }
}

/// One step of the results table, pre-formatted for display.
pub struct ResultRow {
    pub link_id: String,
    pub ability_name: String,
    pub technique_id: String,
    pub executed_at: String,
    pub detected: bool,
    pub match_count: usize,
    pub confidence: String,
    pub alert: String,
    pub alert_time: String,
}

impl From<&DetectionRow> for ResultRow {
    fn from(row: &DetectionRow) -> Self {
        let alert = row.matches.first();
        Self {
            link_id: row.link_id.clone(),
            ability_name: row.ability_name.clone(),
            technique_id: row.technique_id.clone().unwrap_or_else(|| "-".to_string()),
            executed_at: row
                .executed_at
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string()),
            detected: row.detected,
            match_count: row.match_count,
            confidence: format!("{:.2}", row.confidence),
            alert: alert
                .map(|a| {
                    format!(
                        "{} {}",
                        a.rule_id.as_deref().unwrap_or("?"),
                        a.rule_description.as_deref().unwrap_or("")
                    )
                    .trim()
                    .to_string()
                })
                .unwrap_or_default(),
            alert_time: alert
                .map(|a| a.timestamp.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }
}
