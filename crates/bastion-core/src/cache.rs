//! Short-lived cache of loaded operation chains.
//!
//! Loading a chain through `/operations/start` may start the operation, so
//! callers keep the chain here keyed by `(operation_id, time_window_sec)` and
//! skip the start while an entry is live.

use crate::model::OperationChain;
use moka::future::Cache as MokaCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CHAIN_TTL: Duration = Duration::from_secs(60);
const MAX_CACHED_CHAINS: u64 = 256;

type ChainKey = (String, Option<i64>);

/// Statistics for chain cache lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    /// hits / (hits + misses), 0.0 if no lookups.
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(hits: u64, misses: u64, size: u64) -> Self {
        let hit_rate = if hits + misses > 0 {
            hits as f64 / (hits + misses) as f64
        } else {
            0.0
        };
        Self {
            hits,
            misses,
            size,
            hit_rate,
        }
    }
}

/// TTL cache of operation chains.
#[derive(Clone)]
pub struct ChainCache {
    inner: MokaCache<ChainKey, Arc<OperationChain>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl Default for ChainCache {
    fn default() -> Self {
        Self::new(DEFAULT_CHAIN_TTL)
    }
}

impl ChainCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: MokaCache::builder()
                .time_to_live(ttl)
                .max_capacity(MAX_CACHED_CHAINS)
                .build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(
        &self,
        operation_id: &str,
        window_secs: Option<i64>,
    ) -> Option<Arc<OperationChain>> {
        let found = self
            .inner
            .get(&(operation_id.to_string(), window_secs))
            .await;
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("bastion_chain_cache_hits_total").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub async fn insert(
        &self,
        window_secs: Option<i64>,
        chain: OperationChain,
    ) -> Arc<OperationChain> {
        let chain = Arc::new(chain);
        self.inner
            .insert((chain.operation.id.clone(), window_secs), chain.clone())
            .await;
        chain
    }

    pub async fn invalidate(&self, operation_id: &str, window_secs: Option<i64>) {
        self.inner
            .invalidate(&(operation_id.to_string(), window_secs))
            .await;
    }

    pub async fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.inner.entry_count(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperationMeta;
    use chrono::Utc;

    fn chain(id: &str) -> OperationChain {
        OperationChain {
            operation: OperationMeta {
                id: id.into(),
                name: "op".into(),
                state: "running".into(),
                start: None,
                end: None,
            },
            steps: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_keyed_by_operation_and_window() {
        let cache = ChainCache::default();
        cache.insert(Some(60), chain("op-1")).await;

        assert!(cache.get("op-1", Some(60)).await.is_some());
        assert!(cache.get("op-1", Some(120)).await.is_none());
        assert!(cache.get("op-2", Some(60)).await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = ChainCache::default();
        cache.insert(None, chain("op-1")).await;
        cache.insert(None, chain("op-2")).await;

        cache.invalidate("op-1", None).await;
        assert!(cache.get("op-1", None).await.is_none());

        cache.clear().await;
        assert!(cache.get("op-2", None).await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ChainCache::new(Duration::from_millis(50));
        cache.insert(None, chain("op-1")).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("op-1", None).await.is_none());
    }
}
