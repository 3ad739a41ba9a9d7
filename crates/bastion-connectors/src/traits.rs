//! Connector trait definitions for BASTION.
//!
//! Three external systems feed the correlation pipeline: the Wazuh indexer
//! (alert documents), the Wazuh manager (agent inventory and auth status) and
//! Caldera (operations and their executed links). Each is reached through a
//! trait so the pipeline can run against the mocks in tests.

use crate::secure_string::SecureString;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The remote rejected the request body (malformed query syntax etc).
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Health status of a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    Healthy,
    Degraded(String),
    Unhealthy(String),
    Unknown,
}

impl ConnectorHealth {
    /// Short label used in the health payload.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectorHealth::Healthy => "healthy",
            ConnectorHealth::Degraded(_) => "degraded",
            ConnectorHealth::Unhealthy(_) => "unhealthy",
            ConnectorHealth::Unknown => "unknown",
        }
    }
}

/// Configuration for a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name, used in logs.
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    pub auth: AuthConfig,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
    /// Additional headers to include.
    pub headers: HashMap<String, String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    None,
    /// Static key sent in a named header (Caldera uses `KEY`).
    ApiKey {
        key: SecureString,
        header_name: String,
    },
    BearerToken {
        token: SecureString,
    },
    Basic {
        username: String,
        password: SecureString,
    },
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Returns the connector type ("indexer", "manager", "caldera").
    fn connector_type(&self) -> &str;

    fn capabilities(&self) -> Vec<String> {
        vec!["health_check".to_string(), "test_connection".to_string()]
    }

    /// Checks the health of the connector.
    async fn health_check(&self) -> ConnectorResult<ConnectorHealth>;

    /// Tests the connection to the external system.
    async fn test_connection(&self) -> ConnectorResult<bool>;
}

// ============================================
// Alert index (Wazuh indexer / OpenSearch)
// ============================================

/// Search and discovery over the alert index.
#[async_trait]
pub trait AlertIndexConnector: Connector {
    /// Index pattern used when a request does not name one.
    fn default_index(&self) -> &str;

    /// Executes a search.
    async fn search(&self, request: &IndexSearch) -> ConnectorResult<SearchResults>;

    /// Lists the indices visible to the configured user.
    async fn list_indices(&self) -> ConnectorResult<Vec<IndexInfo>>;

    /// Returns the cluster status colour (`green`, `yellow`, `red`).
    async fn cluster_status(&self) -> ConnectorResult<String>;
}

/// Time range for index queries, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The last N minutes ending now.
    pub fn last_minutes(minutes: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::minutes(minutes),
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Sort direction for index searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: "@timestamp".to_string(),
            descending: true,
        }
    }
}

impl SortSpec {
    /// Parses `field:order`; order defaults to descending.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }
        match raw.rsplit_once(':') {
            Some((field, order)) if !field.is_empty() => Self {
                field: field.to_string(),
                descending: !order.eq_ignore_ascii_case("asc"),
            },
            _ => Self {
                field: raw.to_string(),
                descending: true,
            },
        }
    }
}

/// Exact-match filter: a single value becomes a `term`, several a `terms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub values: Vec<serde_json::Value>,
}

/// Inclusive numeric or date bound on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub field: String,
    pub gte: Option<serde_json::Value>,
    pub lte: Option<serde_json::Value>,
}

impl RangeFilter {
    pub fn at_least(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            gte: Some(value.into()),
            lte: None,
        }
    }
}

/// A search against the alert index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSearch {
    /// Index pattern; empty means the connector default.
    pub index: String,
    pub time_range: Option<TimeRange>,
    /// Lucene query string; empty or `*` means match all.
    pub query: Option<String>,
    pub filters: Vec<FieldFilter>,
    pub ranges: Vec<RangeFilter>,
    pub size: usize,
    pub offset: usize,
    pub sort: SortSpec,
}

/// Upper bound of a single page, matching the default `index.max_result_window`.
pub const MAX_PAGE_SIZE: usize = 10_000;

impl Default for IndexSearch {
    fn default() -> Self {
        Self {
            index: String::new(),
            time_range: None,
            query: None,
            filters: Vec::new(),
            ranges: Vec::new(),
            size: 200,
            offset: 0,
            sort: SortSpec::default(),
        }
    }
}

impl IndexSearch {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn bounded_size(&self) -> usize {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    /// The query string, `None` when it selects everything.
    pub fn effective_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty() && *q != "*")
    }
}

/// A raw document returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub index: String,
    pub source: serde_json::Value,
}

/// Results from an index search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Server-side execution time in milliseconds.
    pub took_ms: u64,
    /// Total hits matching the query (may exceed `hits.len()`).
    pub total: u64,
    pub hits: Vec<IndexedDocument>,
}

/// One row of `_cat/indices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub index: String,
    pub health: Option<String>,
    pub status: Option<String>,
    pub docs_count: u64,
    pub store_size: Option<String>,
}

// ============================================
// Wazuh manager
// ============================================

/// Wazuh manager REST API.
#[async_trait]
pub trait ManagerConnector: Connector {
    /// Obtains (or reuses) a JWT for the manager API.
    async fn authenticate(&self) -> ConnectorResult<()>;

    /// Whether a valid token is currently held.
    async fn is_authenticated(&self) -> bool;

    /// Lists registered agents.
    async fn list_agents(&self) -> ConnectorResult<Vec<WazuhAgent>>;
}

/// A Wazuh agent as reported by `GET /agents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WazuhAgent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "lastKeepAlive")]
    pub last_keep_alive: Option<String>,
}

// ============================================
// Caldera
// ============================================

/// Caldera REST API (v2).
#[async_trait]
pub trait OperationConnector: Connector {
    /// Lists all operations.
    async fn list_operations(&self) -> ConnectorResult<Vec<CalderaOperation>>;

    /// Gets one operation with its chain. Unknown ids yield `NotFound`.
    async fn get_operation(&self, operation_id: &str) -> ConnectorResult<CalderaOperation>;

    /// Sets the operation state (`running`, `paused`, `finished`, ...).
    async fn set_operation_state(
        &self,
        operation_id: &str,
        state: &str,
    ) -> ConnectorResult<CalderaOperation>;

    /// Lists deployed agents.
    async fn list_agents(&self) -> ConnectorResult<Vec<CalderaAgent>>;
}

/// A deployed Caldera agent as returned by `/api/v2/agents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalderaAgent {
    pub paw: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub executors: Vec<String>,
    #[serde(default)]
    pub privilege: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub sleep_min: Option<i64>,
    #[serde(default)]
    pub sleep_max: Option<i64>,
    /// Last beacon; Caldera sends an ISO string.
    #[serde(default)]
    pub last_seen: Option<serde_json::Value>,
}

/// An operation as returned by `/api/v2/operations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalderaOperation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub start: Option<serde_json::Value>,
    #[serde(default)]
    pub finish: Option<serde_json::Value>,
    #[serde(default)]
    pub chain: Vec<CalderaLink>,
}

/// One executed link of an operation chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalderaLink {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub paw: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_stringish")]
    pub pid: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub plaintext_command: Option<String>,
    #[serde(default)]
    pub decide: Option<serde_json::Value>,
    #[serde(default)]
    pub start: Option<serde_json::Value>,
    #[serde(default)]
    pub finish: Option<serde_json::Value>,
    #[serde(default)]
    pub ability: CalderaAbility,
}

/// Ability metadata embedded in a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalderaAbility {
    #[serde(default)]
    pub ability_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub technique_id: Option<String>,
    #[serde(default)]
    pub technique_name: Option<String>,
    #[serde(default)]
    pub tactic: Option<String>,
}

/// Accepts a string or a number; empty strings and nulls become `None`.
fn de_opt_stringish<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
