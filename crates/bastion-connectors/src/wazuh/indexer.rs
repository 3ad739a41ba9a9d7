//! Wazuh indexer connector.
//!
//! The indexer is an OpenSearch cluster holding `wazuh-alerts-*` documents.
//! Searches go through `/{index}/_search`; discovery uses `_cat/indices` and
//! the cluster colour comes from `_cluster/health`.

use crate::http::{HttpClient, RateLimitConfig, ResponseCache};
use crate::traits::{
    AlertIndexConnector, ConnectorConfig, ConnectorError, ConnectorHealth, ConnectorResult,
    IndexInfo, IndexSearch, IndexedDocument, SearchResults,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default Wazuh alert index pattern.
pub const DEFAULT_ALERT_INDEX: &str = "wazuh-alerts-*";

/// Wazuh indexer connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WazuhIndexerConfig {
    /// Base connector configuration.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Default index pattern for searches.
    pub index_pattern: String,
    /// Optional client-side request budget.
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

/// Wazuh indexer connector.
pub struct WazuhIndexerConnector {
    config: WazuhIndexerConfig,
    client: HttpClient,
    indices: ResponseCache<Vec<IndexInfo>>,
}

impl WazuhIndexerConnector {
    /// Creates a new indexer connector.
    pub fn new(config: WazuhIndexerConfig) -> ConnectorResult<Self> {
        let rate_limit = config.requests_per_minute.map(|rpm| RateLimitConfig {
            max_requests: rpm,
            period: Duration::from_secs(60),
            burst_size: (rpm / 10).max(1),
        });
        let client = HttpClient::with_rate_limit(config.connector.clone(), rate_limit)?;
        info!(
            "Wazuh indexer connector initialized with index pattern '{}'",
            config.index_pattern
        );
        Ok(Self {
            config,
            client,
            indices: ResponseCache::new(Duration::from_secs(30), 8),
        })
    }

    fn resolve_index<'a>(&'a self, search: &'a IndexSearch) -> &'a str {
        if search.index.trim().is_empty() {
            &self.config.index_pattern
        } else {
            search.index.trim()
        }
    }

    fn parse_hit(hit: OpenSearchHit) -> IndexedDocument {
        IndexedDocument {
            id: hit.id.unwrap_or_default(),
            index: hit.index.unwrap_or_default(),
            source: hit.source,
        }
    }
}

/// Builds the `_search` request body for an [`IndexSearch`].
pub fn build_search_body(search: &IndexSearch) -> Value {
    let mut must = Vec::new();
    let mut filter = Vec::new();

    match search.effective_query() {
        Some(q) => must.push(json!({
            "query_string": { "query": q, "default_operator": "AND" }
        })),
        None => must.push(json!({ "match_all": {} })),
    }

    if let Some(range) = &search.time_range {
        filter.push(json!({
            "range": {
                "@timestamp": {
                    "gte": range.start.to_rfc3339(),
                    "lte": range.end.to_rfc3339()
                }
            }
        }));
    }

    for f in &search.filters {
        match f.values.as_slice() {
            [] => {}
            [single] => filter.push(json!({ "term": { f.field.clone(): single } })),
            many => filter.push(json!({ "terms": { f.field.clone(): many } })),
        }
    }

    for r in &search.ranges {
        let mut bounds = serde_json::Map::new();
        if let Some(gte) = &r.gte {
            bounds.insert("gte".to_string(), gte.clone());
        }
        if let Some(lte) = &r.lte {
            bounds.insert("lte".to_string(), lte.clone());
        }
        if !bounds.is_empty() {
            filter.push(json!({ "range": { r.field.clone(): bounds } }));
        }
    }

    let order = if search.sort.descending { "desc" } else { "asc" };
    json!({
        "query": { "bool": { "must": must, "filter": filter } },
        "from": search.offset,
        "size": search.bounded_size(),
        "track_total_hits": true,
        "sort": [{ search.sort.field.clone(): { "order": order, "unmapped_type": "date" } }]
    })
}

#[async_trait]
impl crate::traits::Connector for WazuhIndexerConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "indexer"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "health_check".to_string(),
            "test_connection".to_string(),
            "search".to_string(),
            "list_indices".to_string(),
        ]
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self.cluster_status().await {
            Ok(status) if status == "red" => Ok(ConnectorHealth::Degraded(
                "Cluster status red".to_string(),
            )),
            Ok(_) => Ok(ConnectorHealth::Healthy),
            Err(ConnectorError::AuthenticationFailed(_)) => Ok(ConnectorHealth::Unhealthy(
                "Authentication failed".to_string(),
            )),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        let response = self.client.get("/_cluster/health").await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl AlertIndexConnector for WazuhIndexerConnector {
    fn default_index(&self) -> &str {
        &self.config.index_pattern
    }

    #[instrument(skip(self, search))]
    async fn search(&self, search: &IndexSearch) -> ConnectorResult<SearchResults> {
        let index = self.resolve_index(search);
        let body = build_search_body(search);
        let path = format!(
            "/{}/_search?ignore_unavailable=true&allow_no_indices=true",
            index
        );
        let result: OpenSearchResponse = self.client.post_json(&path, &body).await?;
        debug!(
            index,
            took_ms = result.took,
            hits = result.hits.hits.len(),
            "Indexer search complete"
        );

        Ok(SearchResults {
            took_ms: result.took,
            total: result.hits.total.map(|t| t.value).unwrap_or(0),
            hits: result.hits.hits.into_iter().map(Self::parse_hit).collect(),
        })
    }

    #[instrument(skip(self))]
    async fn list_indices(&self) -> ConnectorResult<Vec<IndexInfo>> {
        self.indices
            .get_or_try_insert_with("all".to_string(), || async {
                let rows: Vec<CatIndexRow> = self
                    .client
                    .get_json("/_cat/indices?format=json&bytes=b")
                    .await?;
                let mut indices: Vec<IndexInfo> = rows
                    .into_iter()
                    .filter(|r| !r.index.starts_with('.'))
                    .map(CatIndexRow::into_info)
                    .collect();
                indices.sort_by(|a, b| a.index.cmp(&b.index));
                Ok(indices)
            })
            .await
    }

    async fn cluster_status(&self) -> ConnectorResult<String> {
        let health: ClusterHealth = self.client.get_json("/_cluster/health").await?;
        Ok(health.status)
    }
}

// OpenSearch API response types

#[derive(Debug, Deserialize)]
struct OpenSearchResponse {
    #[serde(default)]
    took: u64,
    hits: OpenSearchHits,
}

#[derive(Debug, Deserialize)]
struct OpenSearchHits {
    #[serde(default)]
    total: Option<OpenSearchTotal>,
    #[serde(default)]
    hits: Vec<OpenSearchHit>,
}

#[derive(Debug, Deserialize)]
struct OpenSearchTotal {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct OpenSearchHit {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_index")]
    index: Option<String>,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    status: String,
}

/// `_cat/indices?format=json` reports every column as a string.
#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
    #[serde(default)]
    health: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "docs.count")]
    docs_count: Option<String>,
    #[serde(default, rename = "store.size")]
    store_size: Option<String>,
}

impl CatIndexRow {
    fn into_info(self) -> IndexInfo {
        IndexInfo {
            docs_count: self
                .docs_count
                .as_deref()
                .and_then(|c| c.parse().ok())
                .unwrap_or(0),
            index: self.index,
            health: self.health,
            status: self.status,
            store_size: self.store_size,
        }
    }
}
