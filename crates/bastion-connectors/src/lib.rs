//! # bastion-connectors
//!
//! Connectors for the systems BASTION correlates: the Wazuh indexer (alert
//! search and index discovery), the Wazuh manager (authentication and agent
//! inventory) and Caldera (operations, their executed links and agents).

pub mod caldera;
pub mod http;
pub mod secure_string;
pub mod testing;
pub mod traits;
pub mod wazuh;

pub use secure_string::SecureString;

pub use traits::{
    AlertIndexConnector, AuthConfig, CalderaAbility, CalderaAgent, CalderaLink, CalderaOperation,
    Connector, ConnectorConfig, ConnectorError, ConnectorHealth, ConnectorResult, FieldFilter,
    IndexInfo, IndexSearch, IndexedDocument, ManagerConnector, OperationConnector, RangeFilter,
    SearchResults, SortSpec, TimeRange, WazuhAgent,
};

pub use caldera::{CalderaConfig, CalderaConnector, MockCalderaConnector};
pub use wazuh::{
    MockBehavior, MockIndexerConnector, MockManagerConnector, WazuhIndexerConfig,
    WazuhIndexerConnector, WazuhManagerConfig, WazuhManagerConnector,
};
