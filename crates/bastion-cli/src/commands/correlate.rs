//! Correlate command - runs one correlation against the live lab.

use anyhow::{Context, Result};
use bastion_core::{CorrelationRequest, CoverageReport};
use colored::Colorize;
use std::fmt::Write;

use super::Connectors;
use crate::config::AppConfig;
use crate::OutputFormat;

/// Correlates `op_id` and prints the coverage report.
pub async fn run_correlate(
    config: AppConfig,
    op_id: String,
    window: Option<i64>,
    index: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let connectors = Connectors::from_config(&config)?;
    let service = connectors.service(&config);

    let request = CorrelationRequest {
        window_secs: window,
        index,
        ..CorrelationRequest::for_operation(op_id.clone())
    };
    let outcome = service
        .correlate_operation(request)
        .await
        .with_context(|| format!("Correlation failed for operation {}", op_id))?;
    let report = outcome.report();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    Ok(())
}

/// Renders a report as a colored table.
pub fn render_report(report: &CoverageReport) -> String {
    let mut out = String::new();
    let name = report
        .operation_name
        .as_deref()
        .or(report.operation_id.as_deref())
        .unwrap_or("(alerts only)");

    let _ = writeln!(out, "{}", format!("Operation: {}", name).bold());
    let _ = writeln!(out, "{}", "─".repeat(72));
    if let (Some(start), Some(end)) = (report.start_time, report.end_time) {
        let _ = writeln!(
            out,
            "Range:      {} → {}",
            start.format("%Y-%m-%d %H:%M:%S"),
            end.format("%Y-%m-%d %H:%M:%S")
        );
    }
    let _ = writeln!(out, "Window:     {}s", report.time_window_sec);
    let _ = writeln!(
        out,
        "Detected:   {} of {} eligible steps ({:.1}%)",
        report.detected_steps,
        report.attack_steps,
        report.correlation.detection_rate * 100.0
    );
    let _ = writeln!(
        out,
        "Alerts:     {} matched, {} scanned",
        report.total_alerts, report.alerts_scanned
    );

    if !report.steps.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<28} {:<12} {:<14} {:<9} {:>10}",
            "ABILITY", "TECHNIQUE", "AGENT", "DETECTED", "DELTA"
        );
        for step in &report.steps {
            let detected = if step.detected {
                format!("{:<9}", "yes").green()
            } else if step.eligible {
                format!("{:<9}", "no").red()
            } else {
                format!("{:<9}", "n/a").dimmed()
            };
            let delta = step
                .delta_ms
                .map(|ms| format!("{:+.1}s", ms as f64 / 1000.0))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<28} {:<12} {:<14} {} {:>10}",
                truncate(&step.ability_name, 28),
                step.technique_id.as_deref().unwrap_or("-"),
                truncate(&step.agent_paw, 14),
                detected,
                delta
            );
        }
    }

    let undetected = &report.correlation.undetected_techniques_list;
    if !undetected.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} {}", "Undetected:".yellow(), undetected.join(", "));
    }

    for error in &report.errors {
        let _ = writeln!(out, "{} {}", "warning:".yellow().bold(), error);
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
