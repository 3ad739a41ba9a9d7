//! Operation Chain Loader: reads Caldera operations and their executed links.

use crate::error::{CoreError, CoreResult};
use crate::model::{AttackStep, OperationChain, OperationMeta};
use bastion_connectors::{CalderaAgent, CalderaOperation, OperationConnector};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

/// Caldera states in which an operation has not started running yet.
const NOT_STARTED_STATES: &[&str] = &["", "paused", "ready"];

pub const RUNNING_STATE: &str = "running";

#[derive(Clone)]
pub struct ChainLoader {
    connector: Arc<dyn OperationConnector>,
}

impl ChainLoader {
    pub fn new(connector: Arc<dyn OperationConnector>) -> Self {
        Self { connector }
    }

    /// Loads an operation's steps. With `window_secs`, only steps executed in
    /// the last `window_secs` are kept.
    #[instrument(skip(self))]
    pub async fn load_chain(
        &self,
        operation_id: &str,
        window_secs: Option<i64>,
    ) -> CoreResult<OperationChain> {
        let operation = self.fetch(operation_id).await?;
        Ok(build_chain(&operation, window_secs, Utc::now()))
    }

    /// Loads the chain and sets the operation running if it has not started.
    #[instrument(skip(self))]
    pub async fn start_operation(
        &self,
        operation_id: &str,
        window_secs: Option<i64>,
    ) -> CoreResult<OperationChain> {
        let mut operation = self.fetch(operation_id).await?;
        let state = operation.state.trim().to_ascii_lowercase();
        if NOT_STARTED_STATES.contains(&state.as_str()) {
            info!(operation_id, from = %state, "Starting operation");
            operation = self
                .connector
                .set_operation_state(operation_id, RUNNING_STATE)
                .await
                .map_err(|e| CoreError::from_caldera(operation_id, e))?;
        }
        Ok(build_chain(&operation, window_secs, Utc::now()))
    }

    pub async fn get_operation(&self, operation_id: &str) -> CoreResult<OperationMeta> {
        self.fetch(operation_id)
            .await
            .map(|op| OperationMeta::from_operation(&op))
    }

    /// Operations sorted by start, newest first; unknown starts last.
    pub async fn list_operations(&self) -> CoreResult<Vec<OperationMeta>> {
        let operations = self
            .connector
            .list_operations()
            .await
            .map_err(|e| CoreError::Upstream(e.to_string()))?;
        let mut metas: Vec<OperationMeta> =
            operations.iter().map(OperationMeta::from_operation).collect();
        metas.sort_by(|a, b| match (a.start, b.start) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(metas)
    }

    /// Operations that started within the last `hours`.
    pub async fn recent_operations(&self, hours: i64) -> CoreResult<Vec<OperationMeta>> {
        let cutoff = Duration::try_hours(hours.max(0))
            .and_then(|h| Utc::now().checked_sub_signed(h))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut operations = self.list_operations().await?;
        operations.retain(|op| op.start.is_some_and(|s| s >= cutoff));
        Ok(operations)
    }

    /// Agents deployed by Caldera.
    pub async fn list_agents(&self) -> CoreResult<Vec<CalderaAgent>> {
        self.connector
            .list_agents()
            .await
            .map_err(|e| CoreError::Upstream(e.to_string()))
    }

    async fn fetch(&self, operation_id: &str) -> CoreResult<CalderaOperation> {
        self.connector
            .get_operation(operation_id)
            .await
            .map_err(|e| CoreError::from_caldera(operation_id, e))
    }
}

/// Converts a Caldera operation into a chain, keeping steps executed at or
/// after `now - window_secs` when a window is given. A window reaching past
/// the earliest representable time keeps every step.
pub fn build_chain(
    operation: &CalderaOperation,
    window_secs: Option<i64>,
    now: DateTime<Utc>,
) -> OperationChain {
    let cutoff = window_secs
        .filter(|w| *w > 0)
        .and_then(Duration::try_seconds)
        .and_then(|w| now.checked_sub_signed(w));
    let steps = operation
        .chain
        .iter()
        .map(AttackStep::from_link)
        .filter(|step| match cutoff {
            Some(cutoff) => step.executed_at.is_some_and(|ts| ts >= cutoff),
            None => true,
        })
        .collect();

    OperationChain {
        operation: OperationMeta::from_operation(operation),
        steps,
        loaded_at: now,
    }
}
