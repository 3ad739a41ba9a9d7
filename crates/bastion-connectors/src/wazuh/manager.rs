//! Wazuh manager connector.
//!
//! Authenticates against `POST /security/user/authenticate?raw=true` with
//! basic credentials and reuses the returned JWT for `GET /agents`.

use crate::http::{HttpClient, ResponseCache};
use crate::secure_string::SecureString;
use crate::traits::{
    ConnectorConfig, ConnectorError, ConnectorHealth, ConnectorResult, ManagerConnector,
    WazuhAgent,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

const TOKEN_KEY: &str = "jwt";

/// Wazuh tokens expire after 900 s; refresh a minute early.
const TOKEN_TTL: Duration = Duration::from_secs(840);

/// Wazuh manager connector configuration. `connector.auth` must be `Basic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WazuhManagerConfig {
    #[serde(flatten)]
    pub connector: ConnectorConfig,
}

/// Wazuh manager connector.
pub struct WazuhManagerConnector {
    config: WazuhManagerConfig,
    client: HttpClient,
    tokens: ResponseCache<SecureString>,
}

impl WazuhManagerConnector {
    pub fn new(config: WazuhManagerConfig) -> ConnectorResult<Self> {
        let client = HttpClient::new(config.connector.clone())?;
        info!(base_url = %config.connector.base_url, "Wazuh manager connector initialized");
        Ok(Self {
            config,
            client,
            tokens: ResponseCache::new(TOKEN_TTL, 1),
        })
    }

    async fn token(&self) -> ConnectorResult<SecureString> {
        self.tokens
            .get_or_try_insert_with(TOKEN_KEY.to_string(), || async {
                let raw = self
                    .client
                    .post_empty_text("/security/user/authenticate?raw=true")
                    .await?;
                let token = raw.trim().trim_matches('"').to_string();
                if token.is_empty() {
                    return Err(ConnectorError::AuthenticationFailed(
                        "Empty token returned".to_string(),
                    ));
                }
                info!("Obtained Wazuh manager token");
                Ok(SecureString::new(token))
            })
            .await
    }
}

#[async_trait]
impl crate::traits::Connector for WazuhManagerConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "manager"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "health_check".to_string(),
            "test_connection".to_string(),
            "list_agents".to_string(),
        ]
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self.token().await {
            Ok(_) => Ok(ConnectorHealth::Healthy),
            Err(ConnectorError::AuthenticationFailed(e)) => Ok(ConnectorHealth::Unhealthy(
                format!("Authentication failed: {}", e),
            )),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        self.token().await.map(|_| true)
    }
}

#[async_trait]
impl ManagerConnector for WazuhManagerConnector {
    async fn authenticate(&self) -> ConnectorResult<()> {
        self.token().await.map(|_| ())
    }

    async fn is_authenticated(&self) -> bool {
        self.tokens.get(TOKEN_KEY).await.is_some()
    }

    #[instrument(skip(self))]
    async fn list_agents(&self) -> ConnectorResult<Vec<WazuhAgent>> {
        let token = self.token().await?;
        let result: Result<AgentsResponse, _> = self
            .client
            .get_json_with_bearer("/agents?limit=500", &token)
            .await;

        match result {
            Ok(r) => Ok(r.data.affected_items),
            Err(ConnectorError::AuthenticationFailed(e)) => {
                // Token revoked server side; drop it so the next call re-authenticates.
                warn!("Wazuh manager rejected cached token");
                self.tokens.invalidate(TOKEN_KEY).await;
                Err(ConnectorError::AuthenticationFailed(e))
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentsResponse {
    data: AgentsData,
}

#[derive(Debug, Deserialize)]
struct AgentsData {
    #[serde(default)]
    affected_items: Vec<WazuhAgent>,
}
