//! Metrics collection for BASTION.
//!
//! Correlation metrics are emitted where the work happens (`bastion-core`);
//! this module describes them, records HTTP and dashboard metrics, and
//! installs the Prometheus recorder.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to install Prometheus recorder: {0}")]
    Install(#[from] BuildError),
}

/// Installs the global Prometheus recorder and returns its render handle.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()?;
    MetricsCollector::register_metrics();
    Ok(handle)
}

/// Process-level counters kept alongside the exported metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub requests_total: u64,
    pub errors_total: u64,
    /// Detection rate of the last dashboard summary served.
    pub last_detection_rate: Option<f64>,
}

#[derive(Debug)]
struct Tally {
    started_at: DateTime<Utc>,
    requests: u64,
    errors: u64,
    last_detection_rate: Option<f64>,
}

/// Metrics collector for the HTTP surface.
#[derive(Clone)]
pub struct MetricsCollector {
    tally: Arc<RwLock<Tally>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::register_metrics();
        Self {
            tally: Arc::new(RwLock::new(Tally {
                started_at: Utc::now(),
                requests: 0,
                errors: 0,
                last_detection_rate: None,
            })),
        }
    }

    /// Registers metric descriptions.
    fn register_metrics() {
        describe_counter!(
            "bastion_correlations_total",
            "Total number of operation correlations computed"
        );
        describe_counter!(
            "bastion_steps_detected_total",
            "Total number of attack steps matched to an alert"
        );
        describe_counter!(
            "bastion_indexer_errors_total",
            "Total number of failed or timed out indexer calls"
        );
        describe_counter!(
            "bastion_chain_cache_hits_total",
            "Total number of operation chains served from cache"
        );
        describe_histogram!(
            "bastion_correlation_duration_seconds",
            "Time to correlate one operation"
        );

        describe_counter!("bastion_http_requests_total", "Total number of HTTP requests");
        describe_histogram!(
            "bastion_http_request_duration_seconds",
            "HTTP request latency"
        );
        describe_counter!("bastion_errors_total", "Total number of API errors");

        describe_gauge!(
            "bastion_dashboard_detection_rate",
            "Detection rate of the last dashboard summary"
        );
        describe_gauge!(
            "bastion_dashboard_operations",
            "Operations covered by the last dashboard summary"
        );
    }

    /// Records a completed HTTP request.
    pub async fn record_http_request(&self, method: &str, status: u16, duration_secs: f64) {
        counter!(
            "bastion_http_requests_total",
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("bastion_http_request_duration_seconds", "method" => method.to_string())
            .record(duration_secs);

        let mut tally = self.tally.write().await;
        tally.requests += 1;
        if status >= 500 {
            tally.errors += 1;
        }
    }

    /// Records an error response by code.
    pub fn record_error(&self, code: &str) {
        counter!("bastion_errors_total", "code" => code.to_string()).increment(1);
    }

    /// Records the headline figures of a dashboard summary.
    pub async fn record_dashboard(&self, operations: usize, detection_rate: f64) {
        gauge!("bastion_dashboard_operations").set(operations as f64);
        gauge!("bastion_dashboard_detection_rate").set(detection_rate);
        self.tally.write().await.last_detection_rate = Some(detection_rate);
    }

    pub async fn stats(&self) -> ServiceStats {
        let tally = self.tally.read().await;
        ServiceStats {
            started_at: tally.started_at,
            uptime_seconds: (Utc::now() - tally.started_at).num_seconds(),
            requests_total: tally.requests,
            errors_total: tally.errors,
            last_detection_rate: tally.last_detection_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_tally() {
        let collector = MetricsCollector::new();
        collector.record_http_request("GET", 200, 0.01).await;
        collector.record_http_request("POST", 503, 0.2).await;
        collector.record_http_request("POST", 400, 0.02).await;

        let stats = collector.stats().await;
        assert_eq!(stats.requests_total, 3);
        assert_eq!(stats.errors_total, 1);
        assert!(stats.last_detection_rate.is_none());
    }

    #[tokio::test]
    async fn test_dashboard_snapshot() {
        let collector = MetricsCollector::new();
        collector.record_dashboard(3, 0.75).await;
        assert_eq!(collector.stats().await.last_detection_rate, Some(0.75));
    }

    #[tokio::test]
    async fn test_clones_share_tally() {
        let collector = MetricsCollector::new();
        let clone = collector.clone();
        clone.record_http_request("GET", 200, 0.0).await;
        assert_eq!(collector.stats().await.requests_total, 1);
    }
}
