//! Event Store Adapter over the Wazuh alert index.

use crate::error::{CoreError, CoreResult};
use crate::model::Alert;
use crate::time::resolve_range;
use bastion_connectors::{
    AlertIndexConnector, ConnectorError, FieldFilter, IndexInfo, IndexSearch, RangeFilter,
    SearchResults, SortSpec, TimeRange,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ALERTS: usize = 2000;
/// Range used by discover searches without bounds.
pub const DEFAULT_DISCOVER_MINUTES: i64 = 15;
const TIMESTAMP_FIELD: &str = "@timestamp";

/// Ad-hoc index search issued from the discover view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverRequest {
    pub index: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub size: Option<usize>,
    pub offset: Option<usize>,
    /// `field:order`.
    pub sort: Option<String>,
    /// Column projection; empty keeps every field.
    pub fields: Vec<String>,
    /// Exact-match filters; a list value matches any of its items.
    pub filters: BTreeMap<String, Value>,
}

/// One page of discover results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverPage {
    pub took: u64,
    pub total: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Alert search with bounded latency.
#[derive(Clone)]
pub struct EventStore {
    connector: Arc<dyn AlertIndexConnector>,
    query_timeout: Duration,
    max_alerts: usize,
}

impl EventStore {
    pub fn new(connector: Arc<dyn AlertIndexConnector>) -> Self {
        Self {
            connector,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_max_alerts(mut self, max_alerts: usize) -> Self {
        self.max_alerts = max_alerts.max(1);
        self
    }

    pub fn default_index(&self) -> &str {
        self.connector.default_index()
    }

    /// Alerts in `range`, newest first. Documents without a usable timestamp
    /// are skipped.
    pub async fn search_alerts(
        &self,
        index: Option<&str>,
        range: TimeRange,
        query: Option<&str>,
    ) -> CoreResult<Vec<Alert>> {
        self.search_alerts_min_level(index, range, query, None).await
    }

    /// [`search_alerts`](Self::search_alerts) keeping only alerts whose
    /// `rule.level` is at least `min_level`.
    #[instrument(skip(self), fields(connector = %self.connector.name()))]
    pub async fn search_alerts_min_level(
        &self,
        index: Option<&str>,
        range: TimeRange,
        query: Option<&str>,
        min_level: Option<i64>,
    ) -> CoreResult<Vec<Alert>> {
        let search = IndexSearch {
            index: index.unwrap_or_default().to_string(),
            time_range: Some(range),
            query: query.map(str::to_string),
            ranges: min_level
                .map(|level| vec![RangeFilter::at_least("rule.level", level)])
                .unwrap_or_default(),
            size: self.max_alerts,
            ..Default::default()
        };
        let results = self.run(self.connector.search(&search)).await?;

        let alerts: Vec<Alert> = results.hits.iter().filter_map(Alert::from_document).collect();
        if alerts.len() < results.hits.len() {
            debug!(
                dropped = results.hits.len() - alerts.len(),
                "Skipped alert documents without a timestamp"
            );
        }
        if results.total as usize > alerts.len() && results.hits.len() >= self.max_alerts {
            warn!(
                total = results.total,
                returned = alerts.len(),
                "Alert search truncated"
            );
        }
        Ok(alerts)
    }

    /// Runs a discover search.
    #[instrument(skip(self, request))]
    pub async fn discover(&self, request: &DiscoverRequest) -> CoreResult<DiscoverPage> {
        let range = resolve_range(
            request.from.as_deref(),
            request.to.as_deref(),
            DEFAULT_DISCOVER_MINUTES,
            Utc::now(),
        )?;
        let filters = request
            .filters
            .iter()
            .map(|(field, value)| FieldFilter {
                field: field.clone(),
                values: match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                },
            })
            .collect();
        let search = IndexSearch {
            index: request.index.clone().unwrap_or_default(),
            time_range: Some(range),
            query: request.q.clone(),
            filters,
            ranges: Vec::new(),
            size: request.size.unwrap_or(IndexSearch::default().size),
            offset: request.offset.unwrap_or(0),
            sort: request
                .sort
                .as_deref()
                .map(SortSpec::parse)
                .unwrap_or_default(),
        };

        let results = self.run(self.connector.search(&search)).await?;
        Ok(to_page(results, &request.fields))
    }

    pub async fn list_indices(&self) -> CoreResult<Vec<IndexInfo>> {
        let mut indices = self.run(self.connector.list_indices()).await?;
        indices.retain(|i| !i.index.starts_with('.'));
        indices.sort_by(|a, b| a.index.cmp(&b.index));
        Ok(indices)
    }

    /// Cluster colour, `unreachable` on failure.
    pub async fn cluster_status(&self) -> String {
        match self.run(self.connector.cluster_status()).await {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "Indexer health check failed");
                "unreachable".to_string()
            }
        }
    }

    async fn run<T>(
        &self,
        call: impl Future<Output = Result<T, ConnectorError>>,
    ) -> CoreResult<T> {
        let outcome = match tokio::time::timeout(self.query_timeout, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => CoreError::from_indexer(e),
            Err(_) => CoreError::IndexUnavailable(format!(
                "query timed out after {}s",
                self.query_timeout.as_secs_f64()
            )),
        };
        metrics::counter!("bastion_indexer_errors_total", "kind" => outcome.code())
            .increment(1);
        warn!(error = %outcome, "Indexer call failed");
        Err(outcome)
    }
}

fn to_page(results: SearchResults, fields: &[String]) -> DiscoverPage {
    let rows: Vec<Map<String, Value>> = results
        .hits
        .into_iter()
        .map(|doc| {
            let mut flat = Map::new();
            flatten_into(&mut flat, None, doc.source);
            let mut row = if fields.is_empty() {
                flat
            } else {
                fields
                    .iter()
                    .filter_map(|f| flat.get(f).map(|v| (f.clone(), v.clone())))
                    .collect()
            };
            row.insert("_id".to_string(), Value::String(doc.id));
            row.insert("_index".to_string(), Value::String(doc.index));
            row
        })
        .collect();

    let columns = if fields.is_empty() {
        let keys: BTreeSet<&String> = rows
            .iter()
            .flat_map(|r| r.keys())
            .filter(|k| !k.starts_with('_'))
            .collect();
        let mut columns: Vec<String> = Vec::with_capacity(keys.len());
        if keys.iter().any(|k| k.as_str() == TIMESTAMP_FIELD) {
            columns.push(TIMESTAMP_FIELD.to_string());
        }
        columns.extend(
            keys.into_iter()
                .filter(|k| k.as_str() != TIMESTAMP_FIELD)
                .cloned(),
        );
        columns
    } else {
        fields.to_vec()
    };

    DiscoverPage {
        took: results.took_ms,
        total: results.total,
        columns,
        rows,
    }
}

/// Flattens nested objects into dotted keys. Arrays are kept as values.
fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, value: Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = match prefix {
                    Some(p) => format!("{}.{}", p, key),
                    None => key,
                };
                flatten_into(out, Some(&path), child);
            }
        }
        leaf => {
            if let Some(p) = prefix {
                out.insert(p.to_string(), leaf);
            }
        }
    }
}
