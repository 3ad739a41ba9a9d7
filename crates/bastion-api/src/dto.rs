//! Data Transfer Objects (DTOs) for API requests and responses.

use bastion_connectors::CalderaLink;
use bastion_core::time::parse_timestamp;
use bastion_core::{AttackStep, CorrelationRequest, CoreError, DetectionRow, DiscoverRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;

// ============================================================================
// Correlation DTOs
// ============================================================================

/// An operation as supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct OperationInput {
    pub id: String,
    pub name: Option<String>,
    /// ISO-8601 string or epoch seconds.
    #[schema(value_type = Option<String>)]
    pub start: Option<Value>,
    #[schema(value_type = Option<String>)]
    pub end: Option<Value>,
    /// Caldera links; loaded from Caldera by `id` when absent.
    #[schema(value_type = Option<Vec<Object>>)]
    pub chain: Option<Vec<CalderaLink>>,
}

/// Indexer selection for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct IndexerInput {
    /// Index pattern; the configured default when absent.
    pub index: Option<String>,
    /// Accepted for compatibility. TLS verification is configured on the server.
    pub verify_ssl: Option<bool>,
}

/// Body of `POST /api/correlate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CorrelateRequest {
    pub operation: OperationInput,
    pub indexer: IndexerInput,
    pub time_window_sec: Option<i64>,
}

/// Body of `POST /api/dashboard/summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DashboardRequest {
    /// A single operation.
    pub operation: Option<OperationInput>,
    /// Several operations; takes precedence over `operation`.
    pub operations: Vec<OperationInput>,
    pub indexer: IndexerInput,
    pub time_window_sec: Option<i64>,
    /// Look-back used when no operation is given.
    pub hours: Option<i64>,
    /// Ignore alerts below this rule level.
    pub min_level: Option<i64>,
}

impl OperationInput {
    /// Converts into a core request. An operation needs an id unless it
    /// carries its own chain.
    pub fn into_request(
        self,
        indexer: &IndexerInput,
        window_secs: Option<i64>,
    ) -> Result<CorrelationRequest, ApiError> {
        let id = self.id.trim().to_string();
        if id.is_empty() && self.chain.is_none() {
            return Err(ApiError::missing("operation.id"));
        }
        Ok(CorrelationRequest {
            operation_id: id,
            operation_name: self.name.filter(|n| !n.trim().is_empty()),
            start: parse_bound("operation.start", self.start.as_ref())?,
            end: parse_bound("operation.end", self.end.as_ref())?,
            steps: self
                .chain
                .map(|links| links.iter().map(AttackStep::from_link).collect()),
            index: indexer.index.clone().filter(|i| !i.trim().is_empty()),
            window_secs,
            query: None,
            min_level: None,
        })
    }
}

impl DashboardRequest {
    /// Core requests for every operation named in the body; empty when the
    /// body names none.
    pub fn into_requests(self) -> Result<Vec<CorrelationRequest>, ApiError> {
        let inputs = if self.operations.is_empty() {
            self.operation
                .into_iter()
                .filter(|op| !op.id.trim().is_empty() || op.chain.is_some())
                .collect()
        } else {
            self.operations
        };
        inputs
            .into_iter()
            .map(|op| op.into_request(&self.indexer, self.time_window_sec))
            .collect()
    }
}

/// A present but unparseable bound is an error; null and "" are absent.
fn parse_bound(field: &str, value: Option<&Value>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => parse_timestamp(v).map(Some).ok_or_else(|| {
            ApiError::Core(CoreError::InvalidTime(format!("{}: {}", field, v)))
        }),
    }
}

// ============================================================================
// Health DTOs
// ============================================================================

/// Body of `GET /api/health`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub plugin: String,
    /// `healthy`, `degraded`, `unhealthy` or `unknown`.
    pub wazuh_manager: String,
    /// Cluster status (`green`, `yellow`, `red`) or `unreachable`.
    pub wazuh_indexer: String,
    pub authenticated: bool,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
}

// ============================================================================
// Operation DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OperationListItem {
    pub id: String,
    pub name: String,
    pub start: Option<DateTime<Utc>>,
    pub state: String,
}

/// Body of `GET /operations/list`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OperationsListResponse {
    pub ops: Vec<OperationListItem>,
}

/// Body of `POST /operations/start`. Both fields may also come from the query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct StartRequest {
    pub op_id: Option<String>,
    #[schema(value_type = Option<i64>)]
    pub time_window_sec: Option<Value>,
}

/// One executed step of a started operation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OperationEvent {
    pub link_id: String,
    pub technique_id: Option<String>,
    pub ability_name: String,
    pub executed_at: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub pid: Option<String>,
    pub command: Option<String>,
}

impl From<&AttackStep> for OperationEvent {
    fn from(step: &AttackStep) -> Self {
        Self {
            link_id: step.link_id.clone(),
            technique_id: step.technique_id.clone(),
            ability_name: step.ability_name.clone(),
            executed_at: step.executed_at,
            start: step.started_at,
            pid: step.pid.clone(),
            command: step.command.clone(),
        }
    }
}

/// Body returned by `POST /operations/start`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartResponse {
    pub operation_id: String,
    pub events: Vec<OperationEvent>,
    /// Absent when the whole chain was returned.
    pub time_window_sec: Option<i64>,
    /// True when the chain came from cache and Caldera was not contacted.
    pub cached: bool,
}

// ============================================================================
// Detection DTOs
// ============================================================================

/// Query of `GET /detections`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DetectionsQuery {
    pub op_id: Option<String>,
    pub time_window_sec: Option<String>,
    pub index: Option<String>,
}

/// Query of the results page and the export download.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PluginQuery {
    pub op_id: Option<String>,
    pub window: Option<String>,
}

/// Downloadable detection export.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportPayload {
    pub operation_id: String,
    pub generated_at: DateTime<Utc>,
    pub time_window_sec: i64,
    pub results: Vec<DetectionRow>,
}

/// Parses a window parameter. Unparseable values fall back to the default;
/// the range check is left to the service.
pub fn parse_window(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|w| w.trim().parse::<i64>().ok())
}

/// Same as [`parse_window`] for JSON bodies that send numbers or strings.
pub fn window_from_value(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_window(Some(s)),
        _ => None,
    }
}

// ============================================================================
// Agent and alert DTOs
// ============================================================================

/// Query of the agent inventory.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AgentsQuery {
    /// Detection look-back in hours (default 1).
    pub hours: Option<i64>,
}

/// Query of the recent alerts feed.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertsQuery {
    /// Look-back in hours (default 1).
    pub hours: Option<i64>,
    /// Lowest rule level returned (default 7).
    pub min_level: Option<i64>,
    pub index: Option<String>,
}

// ============================================================================
// Discover DTOs
// ============================================================================

/// Query of `GET /discover/search`; `fields` is comma separated.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DiscoverQuery {
    pub index: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub size: Option<usize>,
    pub offset: Option<usize>,
    pub sort: Option<String>,
    pub fields: Option<String>,
}

impl From<DiscoverQuery> for DiscoverRequest {
    fn from(query: DiscoverQuery) -> Self {
        DiscoverRequest {
            index: query.index,
            q: query.q,
            from: query.from,
            to: query.to,
            size: query.size,
            offset: query.offset,
            sort: query.sort,
            fields: query
                .fields
                .map(|f| {
                    f.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            filters: Default::default(),
        }
    }
}
