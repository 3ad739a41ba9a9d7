//! # bastion-observability
//!
//! Logging and metrics infrastructure for BASTION.
//!
//! Logging goes through `tracing` with an env-filtered fmt layer (plain or
//! JSON). Metrics use the `metrics` facade and are exported in Prometheus
//! text format.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::{install_prometheus, MetricsCollector, MetricsError, ServiceStats};
