//! Application state shared across handlers.

use bastion_connectors::ManagerConnector;
use bastion_core::CoverageService;
use bastion_observability::MetricsCollector;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Correlation pipeline (indexer, Caldera and the chain cache).
    pub service: CoverageService,
    /// Wazuh manager, used for health reporting and the agent inventory.
    pub manager: Arc<dyn ManagerConnector>,
    /// HTTP and dashboard metrics.
    pub metrics: MetricsCollector,
    /// Prometheus metrics handle for rendering metrics.
    pub prometheus_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(service: CoverageService, manager: Arc<dyn ManagerConnector>) -> Self {
        Self {
            service,
            manager,
            metrics: MetricsCollector::new(),
            prometheus_handle: None,
        }
    }

    /// Creates a new application state with Prometheus handle.
    pub fn with_prometheus_handle(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus_handle = Some(Arc::new(handle));
        self
    }

    /// Default match window in seconds.
    pub fn default_window(&self) -> i64 {
        self.service.config().window_secs
    }
}
