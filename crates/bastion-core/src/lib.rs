//! # bastion-core
//!
//! Correlates Caldera operations with Wazuh detections.
//!
//! Data flows from the [`ChainLoader`] (executed attack steps) and the
//! [`EventStore`] (alerts) into [`correlate`], whose [`CorrelationResult`] is
//! the single source for every derived view: tactic coverage, per-agent
//! counts, coverage reports and the dashboard summary. The [`agents`] module
//! joins Caldera and Wazuh agent inventories for the agent view.

pub mod agents;
pub mod cache;
pub mod chain_loader;
pub mod correlation;
pub mod coverage;
pub mod error;
pub mod event_store;
pub mod mitre;
pub mod model;
pub mod service;
pub mod summary;
pub mod time;

pub use agents::{
    match_agents, AgentDetection, AgentInventory, AgentView, RecentAlerts, DEFAULT_ALERT_HOURS,
    DEFAULT_ALERT_MIN_LEVEL,
};
pub use cache::{CacheStats, ChainCache, DEFAULT_CHAIN_TTL};
pub use chain_loader::{build_chain, ChainLoader};
pub use correlation::{
    correlate, CorrelationConfig, CorrelationResult, MatchKind, StepCorrelation,
    DEFAULT_CLOCK_SKEW_SECS, MAX_WINDOW_SECS,
};
pub use coverage::{
    agent_detections, aggregate_by_tactic, detection_rows, merge_tactic_coverage,
    technique_breakdown, AlertSummary, CoverageReport, DetectionRow, StepView, TacticCoverage,
    TechniqueCoverage,
};
pub use error::{CoreError, CoreResult};
pub use event_store::{DiscoverPage, DiscoverRequest, EventStore};
pub use model::{
    Alert, AlertAgent, AlertMitre, AttackStep, OperationChain, OperationMeta, TechniqueSource,
};
pub use service::{
    CorrelationOutcome, CorrelationRequest, CoverageService, DetectionReport, ServiceConfig,
    StartedOperation,
};
pub use summary::{build_summary, DashboardSummary, Kpi, OperationRow, TimelinePoint};
