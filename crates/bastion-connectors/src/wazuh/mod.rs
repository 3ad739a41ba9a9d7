//! Wazuh connectors: the alert indexer and the manager API.

mod indexer;
mod manager;
mod mock;

pub use indexer::{
    build_search_body, WazuhIndexerConfig, WazuhIndexerConnector, DEFAULT_ALERT_INDEX,
};
pub use manager::{WazuhManagerConfig, WazuhManagerConnector};
pub use mock::{MockBehavior, MockIndexerConnector, MockManagerConnector};
