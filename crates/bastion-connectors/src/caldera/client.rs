//! Caldera REST v2 connector.

use crate::http::HttpClient;
use crate::secure_string::SecureString;
use crate::traits::{
    AuthConfig, CalderaAgent, CalderaOperation, ConnectorConfig, ConnectorError, ConnectorHealth,
    ConnectorResult, OperationConnector,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Caldera connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalderaConfig {
    pub base_url: String,
    /// Value of the `KEY` header (red or blue API key).
    pub api_key: SecureString,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

fn default_timeout() -> u64 {
    10
}

impl CalderaConfig {
    fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            name: "caldera".to_string(),
            base_url: self.base_url.clone(),
            auth: AuthConfig::ApiKey {
                key: self.api_key.clone(),
                header_name: "KEY".to_string(),
            },
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            verify_tls: true,
            headers: HashMap::new(),
        }
    }
}

/// Caldera connector.
pub struct CalderaConnector {
    client: HttpClient,
}

impl CalderaConnector {
    pub fn new(config: CalderaConfig) -> ConnectorResult<Self> {
        let client = HttpClient::new(config.connector_config())?;
        info!(base_url = %config.base_url, "Caldera connector initialized");
        Ok(Self { client })
    }

    fn operation_path(operation_id: &str) -> String {
        format!("/api/v2/operations/{}", urlencoding::encode(operation_id))
    }
}

fn not_found(operation_id: &str, err: ConnectorError) -> ConnectorError {
    match err {
        ConnectorError::NotFound(_) => {
            ConnectorError::NotFound(format!("Operation not found: {}", operation_id))
        }
        other => other,
    }
}

#[async_trait]
impl crate::traits::Connector for CalderaConnector {
    fn name(&self) -> &str {
        "caldera"
    }

    fn connector_type(&self) -> &str {
        "caldera"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "health_check".to_string(),
            "test_connection".to_string(),
            "list_operations".to_string(),
            "get_operation".to_string(),
            "set_operation_state".to_string(),
            "list_agents".to_string(),
        ]
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self.client.get("/api/v2/health").await {
            Ok(r) if r.status().is_success() => Ok(ConnectorHealth::Healthy),
            Ok(r) => Ok(ConnectorHealth::Degraded(format!(
                "Unexpected status {}",
                r.status()
            ))),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        let response = self.client.get("/api/v2/health").await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl OperationConnector for CalderaConnector {
    #[instrument(skip(self))]
    async fn list_operations(&self) -> ConnectorResult<Vec<CalderaOperation>> {
        self.client.get_json("/api/v2/operations").await
    }

    #[instrument(skip(self))]
    async fn get_operation(&self, operation_id: &str) -> ConnectorResult<CalderaOperation> {
        self.client
            .get_json(&Self::operation_path(operation_id))
            .await
            .map_err(|e| not_found(operation_id, e))
    }

    #[instrument(skip(self))]
    async fn set_operation_state(
        &self,
        operation_id: &str,
        state: &str,
    ) -> ConnectorResult<CalderaOperation> {
        info!(operation_id, state, "Updating Caldera operation state");
        self.client
            .patch_json(
                &Self::operation_path(operation_id),
                &serde_json::json!({ "state": state }),
            )
            .await
            .map_err(|e| not_found(operation_id, e))
    }

    #[instrument(skip(self))]
    async fn list_agents(&self) -> ConnectorResult<Vec<CalderaAgent>> {
        self.client.get_json("/api/v2/agents").await
    }
}
