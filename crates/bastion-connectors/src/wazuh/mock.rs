//! Mock Wazuh connectors for testing.
//!
//! The indexer mock evaluates searches in memory (time range, simple query,
//! exact filters, sort, paging) so correlation can be exercised end to end.
//! Both mocks support failure injection through [`MockBehavior`].

use crate::traits::{
    AlertIndexConnector, ConnectorError, ConnectorHealth, ConnectorResult, IndexInfo, IndexSearch,
    IndexedDocument, ManagerConnector, SearchResults, WazuhAgent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Behavior configuration for failure injection.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Normal operation.
    #[default]
    Normal,
    /// Fail after N calls.
    FailAfter { calls: u64, error: ConnectorError },
    /// Delay every call.
    Slow(std::time::Duration),
    /// Always fail.
    AlwaysFail(ConnectorError),
    /// Unhealthy status.
    Unhealthy(String),
}

impl MockBehavior {
    /// Applies the behavior for call number `count` (1-based).
    pub async fn apply(&self, count: u64) -> ConnectorResult<()> {
        match self {
            MockBehavior::Normal | MockBehavior::Unhealthy(_) => Ok(()),
            MockBehavior::FailAfter { calls, error } if count > *calls => Err(error.clone()),
            MockBehavior::FailAfter { .. } => Ok(()),
            MockBehavior::Slow(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            MockBehavior::AlwaysFail(error) => Err(error.clone()),
        }
    }

    /// Health derived from the behavior.
    pub fn health(&self) -> ConnectorHealth {
        match self {
            MockBehavior::Unhealthy(reason) => ConnectorHealth::Unhealthy(reason.clone()),
            MockBehavior::AlwaysFail(e) => ConnectorHealth::Unhealthy(e.to_string()),
            _ => ConnectorHealth::Healthy,
        }
    }
}

/// Mock Wazuh indexer holding documents in memory.
pub struct MockIndexerConnector {
    name: String,
    index_pattern: String,
    documents: Arc<RwLock<Vec<IndexedDocument>>>,
    behavior: Arc<RwLock<MockBehavior>>,
    call_count: AtomicU64,
    search_history: Arc<RwLock<Vec<IndexSearch>>>,
}

impl MockIndexerConnector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index_pattern: crate::wazuh::DEFAULT_ALERT_INDEX.to_string(),
            documents: Arc::new(RwLock::new(Vec::new())),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            call_count: AtomicU64::new(0),
            search_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Adds documents to the mock index.
    pub async fn add_documents(&self, docs: Vec<IndexedDocument>) {
        self.documents.write().await.extend(docs);
    }

    /// Sets the behavior for failure injection.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// Searches issued so far, for test verification.
    pub async fn get_search_history(&self) -> Vec<IndexSearch> {
        self.search_history.read().await.clone()
    }

    async fn check_behavior(&self) -> ConnectorResult<()> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.behavior.read().await.clone();
        behavior.apply(count).await
    }

    fn index_matches(pattern: &str, index: &str) -> bool {
        pattern.split(',').map(str::trim).any(|p| match p.strip_suffix('*') {
            Some(prefix) => index.starts_with(prefix),
            None => p == index,
        })
    }

    fn matches(doc: &IndexedDocument, search: &IndexSearch, pattern: &str) -> bool {
        if !Self::index_matches(pattern, &doc.index) {
            return false;
        }
        if let Some(range) = &search.time_range {
            match doc_timestamp(&doc.source) {
                Some(ts) if range.contains(ts) => {}
                _ => return false,
            }
        }
        if let Some(query) = search.effective_query() {
            if !query_matches(&doc.source, query) {
                return false;
            }
        }
        let ranges_match = search.ranges.iter().all(|r| {
            let value = lookup(&doc.source, &r.field);
            value.is_some()
                && r.gte
                    .as_ref()
                    .map_or(true, |gte| compare_values(value, Some(gte)) != CmpOrdering::Less)
                && r.lte
                    .as_ref()
                    .map_or(true, |lte| compare_values(value, Some(lte)) != CmpOrdering::Greater)
        });
        ranges_match
            && search.filters.iter().all(|f| {
                lookup(&doc.source, &f.field)
                    .map(|v| f.values.iter().any(|want| loosely_equal(v, want)))
                    .unwrap_or(false)
            })
    }
}

fn doc_timestamp(source: &Value) -> Option<DateTime<Utc>> {
    source
        .get("@timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolves a dotted path against nested objects, then as a flat key.
fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    let nested = path
        .split('.')
        .try_fold(source, |node, part| node.get(part));
    nested.or_else(|| source.get(path))
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(items), _) => items.iter().any(|i| loosely_equal(i, b)),
        (Value::String(x), Value::String(y)) => x == y,
        _ => scalar_text(a) == scalar_text(b),
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `field:value` compares one field, anything else is a substring match.
fn query_matches(source: &Value, query: &str) -> bool {
    match query.split_once(':') {
        Some((field, value)) if !field.contains(' ') => lookup(source, field)
            .map(|v| loosely_equal(v, &Value::String(value.trim_matches('"').to_string())))
            .unwrap_or(false),
        _ => source
            .to_string()
            .to_lowercase()
            .contains(&query.to_lowercase()),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(x), Some(y)) => scalar_text(x).cmp(&scalar_text(y)),
        (Some(_), None) => CmpOrdering::Greater,
        (None, Some(_)) => CmpOrdering::Less,
        (None, None) => CmpOrdering::Equal,
    }
}

#[async_trait]
impl crate::traits::Connector for MockIndexerConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "indexer"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(self.behavior.read().await.health())
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(e) => Err(e.clone()),
            MockBehavior::Unhealthy(_) => Ok(false),
            _ => Ok(true),
        }
    }
}

#[async_trait]
impl AlertIndexConnector for MockIndexerConnector {
    fn default_index(&self) -> &str {
        &self.index_pattern
    }

    async fn search(&self, search: &IndexSearch) -> ConnectorResult<SearchResults> {
        self.check_behavior().await?;
        self.search_history.write().await.push(search.clone());

        let pattern = if search.index.trim().is_empty() {
            self.index_pattern.as_str()
        } else {
            search.index.trim()
        };

        let documents = self.documents.read().await;
        let mut matched: Vec<IndexedDocument> = documents
            .iter()
            .filter(|d| Self::matches(d, search, pattern))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ord = compare_values(
                lookup(&a.source, &search.sort.field),
                lookup(&b.source, &search.sort.field),
            );
            if search.sort.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(search.offset)
            .take(search.bounded_size())
            .collect();

        Ok(SearchResults {
            took_ms: 1,
            total,
            hits,
        })
    }

    async fn list_indices(&self) -> ConnectorResult<Vec<IndexInfo>> {
        self.check_behavior().await?;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for doc in self.documents.read().await.iter() {
            *counts.entry(doc.index.clone()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(index, docs_count)| IndexInfo {
                index,
                health: Some("green".to_string()),
                status: Some("open".to_string()),
                docs_count,
                store_size: None,
            })
            .collect())
    }

    async fn cluster_status(&self) -> ConnectorResult<String> {
        self.check_behavior().await?;
        Ok("green".to_string())
    }
}

/// Mock Wazuh manager.
pub struct MockManagerConnector {
    name: String,
    agents: Arc<RwLock<Vec<WazuhAgent>>>,
    behavior: Arc<RwLock<MockBehavior>>,
    call_count: AtomicU64,
    authenticated: AtomicBool,
}

impl MockManagerConnector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            agents: Arc::new(RwLock::new(Vec::new())),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            call_count: AtomicU64::new(0),
            authenticated: AtomicBool::new(false),
        }
    }

    pub async fn add_agent(&self, agent: WazuhAgent) {
        self.agents.write().await.push(agent);
    }

    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    async fn check_behavior(&self) -> ConnectorResult<()> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.behavior.read().await.clone();
        behavior.apply(count).await
    }
}

#[async_trait]
impl crate::traits::Connector for MockManagerConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "manager"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(self.behavior.read().await.health())
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(self.check_behavior().await.is_ok())
    }
}

#[async_trait]
impl ManagerConnector for MockManagerConnector {
    async fn authenticate(&self) -> ConnectorResult<()> {
        self.check_behavior().await?;
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn list_agents(&self) -> ConnectorResult<Vec<WazuhAgent>> {
        self.authenticate().await?;
        Ok(self.agents.read().await.clone())
    }
}
