//! Mock Caldera connector for testing.

use crate::traits::{
    CalderaAgent, CalderaOperation, ConnectorError, ConnectorHealth, ConnectorResult,
    OperationConnector,
};
use crate::wazuh::MockBehavior;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock Caldera holding operations in memory.
pub struct MockCalderaConnector {
    operations: Arc<RwLock<Vec<CalderaOperation>>>,
    agents: Arc<RwLock<Vec<CalderaAgent>>>,
    behavior: Arc<RwLock<MockBehavior>>,
    call_count: AtomicU64,
    state_changes: Arc<RwLock<Vec<(String, String)>>>,
}

impl Default for MockCalderaConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCalderaConnector {
    pub fn new() -> Self {
        Self {
            operations: Arc::new(RwLock::new(Vec::new())),
            agents: Arc::new(RwLock::new(Vec::new())),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            call_count: AtomicU64::new(0),
            state_changes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn add_operation(&self, operation: CalderaOperation) {
        self.operations.write().await.push(operation);
    }

    pub async fn add_agent(&self, agent: CalderaAgent) {
        self.agents.write().await.push(agent);
    }

    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// `(operation_id, state)` pairs passed to `set_operation_state`.
    pub async fn get_state_changes(&self) -> Vec<(String, String)> {
        self.state_changes.read().await.clone()
    }

    /// Total calls made against the mock.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn check_behavior(&self) -> ConnectorResult<()> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.behavior.read().await.clone();
        behavior.apply(count).await
    }
}

#[async_trait]
impl crate::traits::Connector for MockCalderaConnector {
    fn name(&self) -> &str {
        "caldera-mock"
    }

    fn connector_type(&self) -> &str {
        "caldera"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(self.behavior.read().await.health())
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(self.check_behavior().await.is_ok())
    }
}

#[async_trait]
impl OperationConnector for MockCalderaConnector {
    async fn list_operations(&self) -> ConnectorResult<Vec<CalderaOperation>> {
        self.check_behavior().await?;
        Ok(self.operations.read().await.clone())
    }

    async fn get_operation(&self, operation_id: &str) -> ConnectorResult<CalderaOperation> {
        self.check_behavior().await?;
        self.operations
            .read()
            .await
            .iter()
            .find(|op| op.id == operation_id)
            .cloned()
            .ok_or_else(|| {
                ConnectorError::NotFound(format!("Operation not found: {}", operation_id))
            })
    }

    async fn set_operation_state(
        &self,
        operation_id: &str,
        state: &str,
    ) -> ConnectorResult<CalderaOperation> {
        self.check_behavior().await?;
        let mut operations = self.operations.write().await;
        let op = operations
            .iter_mut()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| {
                ConnectorError::NotFound(format!("Operation not found: {}", operation_id))
            })?;
        op.state = state.to_string();
        self.state_changes
            .write()
            .await
            .push((operation_id.to_string(), state.to_string()));
        Ok(op.clone())
    }

    async fn list_agents(&self) -> ConnectorResult<Vec<CalderaAgent>> {
        self.check_behavior().await?;
        Ok(self.agents.read().await.clone())
    }
}
