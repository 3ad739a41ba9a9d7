//! CLI subcommands.

mod check;
mod config;
mod correlate;
mod serve;

pub use check::run_check;
pub use config::show_config;
pub use correlate::run_correlate;
pub use serve::{run_server, ServeConfig};

use anyhow::{Context, Result};
use bastion_connectors::{CalderaConnector, WazuhIndexerConnector, WazuhManagerConnector};
use bastion_core::{ChainCache, ChainLoader, CoverageService, EventStore};
use std::sync::Arc;

use crate::config::AppConfig;

/// Live connectors built from the configuration.
pub struct Connectors {
    pub indexer: Arc<WazuhIndexerConnector>,
    pub manager: Arc<WazuhManagerConnector>,
    pub caldera: Arc<CalderaConnector>,
}

impl Connectors {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let indexer = WazuhIndexerConnector::new(config.indexer_config())
            .context("Failed to create Wazuh indexer connector")?;
        let manager = WazuhManagerConnector::new(config.manager_config())
            .context("Failed to create Wazuh manager connector")?;
        let caldera = CalderaConnector::new(config.caldera_config())
            .context("Failed to create Caldera connector")?;

        Ok(Self {
            indexer: Arc::new(indexer),
            manager: Arc::new(manager),
            caldera: Arc::new(caldera),
        })
    }

    /// Wires the correlation service over these connectors.
    pub fn service(&self, config: &AppConfig) -> CoverageService {
        let events = EventStore::new(self.indexer.clone())
            .with_query_timeout(config.query_timeout())
            .with_max_alerts(config.indexer.max_alerts);

        CoverageService::new(
            events,
            ChainLoader::new(self.caldera.clone()),
            ChainCache::new(config.cache_ttl()),
        )
        .with_config(config.service_config())
    }
}
