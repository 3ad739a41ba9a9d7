//! Coverage service: wires the chain loader, the event store and the
//! correlation engine together.
//!
//! Each request is computed fresh. Only operation chains loaded through
//! [`CoverageService::start_operation`] are cached, so that an operation is
//! not started twice while its chain is live.

use crate::agents::{
    match_agents, AgentInventory, RecentAlerts, DEFAULT_ALERT_HOURS, DEFAULT_ALERT_MIN_LEVEL,
    DETECTION_MIN_LEVEL,
};
use crate::cache::ChainCache;
use crate::chain_loader::ChainLoader;
use crate::correlation::{
    correlate, CorrelationConfig, CorrelationResult, DEFAULT_CLOCK_SKEW_SECS, MAX_WINDOW_SECS,
};
use crate::coverage::{detection_rows, CoverageReport, DetectionRow};
use crate::error::{CoreError, CoreResult};
use crate::event_store::EventStore;
use crate::model::{AttackStep, OperationChain, OperationMeta};
use crate::summary::{build_summary, DashboardSummary};
use crate::time::ensure_range;
use bastion_connectors::{IndexInfo, ManagerConnector, TimeRange};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

pub const DEFAULT_WINDOW_SECS: i64 = 60;
pub const DEFAULT_RANGE_MINUTES: i64 = 60;
pub const DEFAULT_SUMMARY_HOURS: i64 = 24;

/// Service tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Match window after each step.
    pub window_secs: i64,
    /// Tolerated agent clock skew before each step.
    pub clock_skew_secs: i64,
    /// Length of the range used when an operation has no start.
    pub default_range_minutes: i64,
    /// How far back the dashboard looks when no operation is given.
    pub summary_hours: i64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            default_range_minutes: DEFAULT_RANGE_MINUTES,
            summary_hours: DEFAULT_SUMMARY_HOURS,
        }
    }
}

/// What to correlate for one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationRequest {
    pub operation_id: String,
    pub operation_name: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Steps supplied by the caller; loaded from Caldera when absent.
    pub steps: Option<Vec<AttackStep>>,
    /// Index pattern; the indexer default when absent.
    pub index: Option<String>,
    pub window_secs: Option<i64>,
    /// Extra query narrowing the alert search.
    pub query: Option<String>,
    /// Ignore alerts below this rule level.
    pub min_level: Option<i64>,
}

impl CorrelationRequest {
    pub fn for_operation(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            ..Default::default()
        }
    }
}

/// A correlation plus the non-fatal failures met while computing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationOutcome {
    pub result: CorrelationResult,
    pub errors: Vec<String>,
}

impl CorrelationOutcome {
    pub fn report(&self) -> CoverageReport {
        CoverageReport::new(&self.result, self.errors.clone())
    }
}

/// Per-step detections for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub operation_id: String,
    pub generated_at: DateTime<Utc>,
    pub time_window_sec: i64,
    pub results: Vec<DetectionRow>,
    pub coverage: CoverageReport,
}

/// A started operation's chain.
#[derive(Debug, Clone)]
pub struct StartedOperation {
    pub chain: Arc<OperationChain>,
    /// True when served from the chain cache without touching Caldera.
    pub cached: bool,
}

#[derive(Clone)]
pub struct CoverageService {
    events: EventStore,
    chains: ChainLoader,
    cache: ChainCache,
    config: ServiceConfig,
}

impl CoverageService {
    pub fn new(events: EventStore, chains: ChainLoader, cache: ChainCache) -> Self {
        Self {
            events,
            chains,
            cache,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn chains(&self) -> &ChainLoader {
        &self.chains
    }

    pub fn cache(&self) -> &ChainCache {
        &self.cache
    }

    fn resolve_window(&self, requested: Option<i64>) -> CoreResult<i64> {
        let window = requested.unwrap_or(self.config.window_secs);
        if window <= 0 {
            return Err(CoreError::InvalidWindow(format!(
                "time_window_sec must be positive, got {}",
                window
            )));
        }
        if window > MAX_WINDOW_SECS {
            return Err(CoreError::InvalidWindow(format!(
                "time_window_sec must be at most {}, got {}",
                MAX_WINDOW_SECS, window
            )));
        }
        Ok(window)
    }

    /// Correlates one operation.
    ///
    /// An unreachable indexer yields a result with every step undetected; a
    /// failed chain load yields a result built from the alerts alone. Both
    /// failures are listed in `errors`. Unknown operations, invalid windows
    /// and malformed queries are returned as errors.
    #[instrument(skip(self, request), fields(operation_id = %request.operation_id))]
    pub async fn correlate_operation(
        &self,
        request: CorrelationRequest,
    ) -> CoreResult<CorrelationOutcome> {
        let started = Instant::now();
        let window = self.resolve_window(request.window_secs)?;
        let mut errors = Vec::new();

        let steps = match request.steps.clone() {
            Some(steps) => Some(steps),
            None => match self.chains.load_chain(&request.operation_id, None).await {
                Ok(chain) => Some(chain.steps),
                Err(e @ CoreError::OperationNotFound(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Chain load failed, correlating alerts only");
                    errors.push(format!("chain: {}", e));
                    None
                }
            },
        };

        let meta = self.operation_meta(&request, steps.as_deref()).await;
        let range = self.search_range(&meta, window);

        let alerts = match self
            .events
            .search_alerts_min_level(
                request.index.as_deref(),
                range,
                request.query.as_deref(),
                request.min_level,
            )
            .await
        {
            Ok(alerts) => alerts,
            Err(e @ CoreError::QueryError(_)) => return Err(e),
            Err(e) => {
                errors.push(format!("indexer: {}", e));
                Vec::new()
            }
        };

        let result = match steps {
            Some(steps) => {
                let config =
                    CorrelationConfig::new(window).with_clock_skew(self.config.clock_skew_secs);
                correlate(steps, &alerts, &config)?.with_operation(meta)
            }
            None => CorrelationResult::from_alerts_only(Some(meta), alerts, window),
        };

        metrics::counter!("bastion_correlations_total").increment(1);
        metrics::counter!("bastion_steps_detected_total").increment(result.detected_steps as u64);
        metrics::histogram!("bastion_correlation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(
            eligible = result.eligible_steps,
            detected = result.detected_steps,
            alerts = result.alerts_scanned,
            rate = result.detection_rate,
            "Correlation complete"
        );

        Ok(CorrelationOutcome { result, errors })
    }

    /// Operation metadata from the request, falling back to Caldera and then
    /// to the step timestamps.
    async fn operation_meta(
        &self,
        request: &CorrelationRequest,
        steps: Option<&[AttackStep]>,
    ) -> OperationMeta {
        let mut meta = OperationMeta {
            id: request.operation_id.clone(),
            name: request.operation_name.clone().unwrap_or_default(),
            state: String::new(),
            start: request.start,
            end: request.end,
        };
        if request.steps.is_some() && meta.start.is_some() && !meta.name.is_empty() {
            return meta;
        }
        if let Ok(known) = self.chains.get_operation(&request.operation_id).await {
            if meta.name.is_empty() {
                meta.name = known.name;
            }
            meta.state = known.state;
            meta.start = meta.start.or(known.start);
            meta.end = meta.end.or(known.end);
        }

        let executed = steps
            .unwrap_or_default()
            .iter()
            .filter_map(|s| s.executed_at);
        if meta.start.is_none() {
            meta.start = executed.clone().min();
        }
        if meta.end.is_none() {
            meta.end = executed.max();
        }
        meta
    }

    /// Alert search range: the operation range widened by the clock skew
    /// before and the match window after, saturating at the representable
    /// bounds.
    fn search_range(&self, meta: &OperationMeta, window_secs: i64) -> TimeRange {
        let range = ensure_range(
            meta.start,
            meta.end,
            self.config.default_range_minutes,
            Utc::now(),
        );
        let start = Duration::try_seconds(self.config.clock_skew_secs)
            .and_then(|skew| range.start.checked_sub_signed(skew))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = Duration::try_seconds(window_secs)
            .and_then(|window| range.end.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        TimeRange::new(start, end)
    }

    /// Builds the dashboard summary. With no requests, the operations started
    /// in the last `summary_hours` are used.
    ///
    /// A single requested operation that cannot be correlated fails the
    /// summary. With several, failed operations are left out and listed in
    /// the summary `errors`, next to the degraded lookups of the others.
    #[instrument(skip(self, requests), fields(requested = requests.len()))]
    pub async fn dashboard_summary(
        &self,
        requests: Vec<CorrelationRequest>,
        hours: Option<i64>,
        min_level: Option<i64>,
    ) -> CoreResult<DashboardSummary> {
        let requests = if requests.is_empty() {
            let hours = hours.unwrap_or(self.config.summary_hours);
            match self.chains.recent_operations(hours).await {
                Ok(ops) => ops
                    .into_iter()
                    .map(|op| CorrelationRequest {
                        operation_name: Some(op.name),
                        start: op.start,
                        end: op.end,
                        ..CorrelationRequest::for_operation(op.id)
                    })
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "Could not list recent operations");
                    Vec::new()
                }
            }
        } else {
            requests
        };
        let single = requests.len() == 1;
        let operation_ids: Vec<String> =
            requests.iter().map(|r| r.operation_id.clone()).collect();

        let outcomes = join_all(requests.into_iter().map(|r| {
            self.correlate_operation(CorrelationRequest {
                min_level: r.min_level.or(min_level),
                ..r
            })
        }))
        .await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut coverage_errors = None;
        let mut errors = Vec::new();
        for (operation_id, outcome) in operation_ids.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => {
                    errors.extend(
                        outcome
                            .errors
                            .iter()
                            .map(|e| format!("{}: {}", operation_id, e)),
                    );
                    if coverage_errors.is_none() {
                        coverage_errors = Some(outcome.errors);
                    }
                    results.push(outcome.result);
                }
                Err(e) if single => return Err(e),
                Err(e) => {
                    warn!(%operation_id, error = %e, "Skipping operation in summary");
                    errors.push(format!("{}: skipped: {}", operation_id, e));
                }
            }
        }
        let operations: Vec<OperationMeta> =
            results.iter().filter_map(|r| r.operation.clone()).collect();
        Ok(build_summary(
            &operations,
            &results,
            coverage_errors.unwrap_or_default(),
            errors,
        ))
    }

    /// Returns the operation's chain, starting the operation if needed. A
    /// live cached chain is returned without contacting Caldera.
    ///
    /// With a window only the steps executed in the last `window_secs` are
    /// kept; without one the whole chain is returned.
    #[instrument(skip(self))]
    pub async fn start_operation(
        &self,
        operation_id: &str,
        window_secs: Option<i64>,
    ) -> CoreResult<StartedOperation> {
        let window = match window_secs {
            Some(w) => Some(self.resolve_window(Some(w))?),
            None => None,
        };
        if let Some(chain) = self.cache.get(operation_id, window).await {
            return Ok(StartedOperation {
                chain,
                cached: true,
            });
        }
        let chain = self.chains.start_operation(operation_id, window).await?;
        let chain = self.cache.insert(window, chain).await;
        Ok(StartedOperation {
            chain,
            cached: false,
        })
    }

    /// Per-step detections for an operation over its full chain.
    pub async fn detections(
        &self,
        operation_id: &str,
        window_secs: Option<i64>,
        index: Option<String>,
    ) -> CoreResult<DetectionReport> {
        let window = self.resolve_window(window_secs)?;
        let outcome = self
            .correlate_operation(CorrelationRequest {
                index,
                window_secs: Some(window),
                ..CorrelationRequest::for_operation(operation_id)
            })
            .await?;
        Ok(DetectionReport {
            operation_id: operation_id.to_string(),
            generated_at: Utc::now(),
            time_window_sec: window,
            results: detection_rows(&outcome.result),
            coverage: outcome.report(),
        })
    }

    pub async fn list_operations(&self) -> CoreResult<Vec<OperationMeta>> {
        self.chains.list_operations().await
    }

    pub async fn list_indices(&self) -> CoreResult<Vec<IndexInfo>> {
        self.events.list_indices().await
    }

    /// Alerts of the last `hours` at or above `min_level`, newest first,
    /// with techniques filled in from the rule map where the document has
    /// none.
    #[instrument(skip(self))]
    pub async fn recent_alerts(
        &self,
        hours: Option<i64>,
        min_level: Option<i64>,
        index: Option<&str>,
    ) -> CoreResult<RecentAlerts> {
        let now = Utc::now();
        let range = hours_before(now, hours.unwrap_or(DEFAULT_ALERT_HOURS));
        let alerts = self
            .events
            .search_alerts_min_level(
                index,
                range,
                None,
                Some(min_level.unwrap_or(DEFAULT_ALERT_MIN_LEVEL)),
            )
            .await?;
        info!(alerts = alerts.len(), "Recent alerts loaded");
        Ok(RecentAlerts::new(&alerts, now))
    }

    /// Caldera agents matched to Wazuh agents by host name, each with the
    /// detections raised on its host in the last `hours`.
    ///
    /// Only a Caldera failure fails the inventory. An unreachable manager
    /// leaves every agent unmatched and an unreachable indexer leaves the
    /// detections empty; both are listed in `errors`.
    #[instrument(skip(self, manager))]
    pub async fn agents_with_detections(
        &self,
        manager: &dyn ManagerConnector,
        hours: Option<i64>,
    ) -> CoreResult<AgentInventory> {
        let now = Utc::now();
        let caldera_agents = self.chains.list_agents().await?;
        let mut errors = Vec::new();

        let wazuh_agents = match manager.list_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(error = %e, "Could not list Wazuh agents");
                errors.push(format!("manager: {}", e));
                Vec::new()
            }
        };

        let range = hours_before(now, hours.unwrap_or(DEFAULT_ALERT_HOURS));
        let alerts = match self
            .events
            .search_alerts_min_level(None, range, None, Some(DETECTION_MIN_LEVEL))
            .await
        {
            Ok(alerts) => alerts,
            Err(e) => {
                errors.push(format!("indexer: {}", e));
                Vec::new()
            }
        };

        let agents = match_agents(&caldera_agents, &wazuh_agents, &alerts, now);
        info!(
            agents = agents.len(),
            matched = agents.iter().filter(|a| a.wazuh_matched).count(),
            "Agent inventory built"
        );
        Ok(AgentInventory {
            success: true,
            total_agents: agents.len(),
            agents,
            query_time: now,
            errors,
        })
    }
}

/// The `hours` before `now`; negative hours count as zero.
fn hours_before(now: DateTime<Utc>, hours: i64) -> TimeRange {
    let start = Duration::try_hours(hours.max(0))
        .and_then(|h| now.checked_sub_signed(h))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    TimeRange::new(start, now)
}
