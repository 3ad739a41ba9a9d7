//! Error taxonomy for the correlation pipeline.

use bastion_connectors::ConnectorError;
use thiserror::Error;

/// Errors raised by the correlation pipeline.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// The alert index could not be reached, timed out or rejected our credentials.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The index rejected the query syntax. The message is the indexer's own.
    #[error("{0}")]
    QueryError(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Unparseable timestamp or relative time expression.
    #[error("Invalid time expression: {0}")]
    InvalidTime(String),

    /// Any other connector failure (Caldera or manager side).
    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Maps an error from an indexer call.
    pub fn from_indexer(err: ConnectorError) -> Self {
        match err {
            ConnectorError::BadRequest(reason) => CoreError::QueryError(reason),
            other => CoreError::IndexUnavailable(other.to_string()),
        }
    }

    /// Maps an error from a Caldera call made for `operation_id`.
    pub fn from_caldera(operation_id: &str, err: ConnectorError) -> Self {
        match err {
            ConnectorError::NotFound(_) => CoreError::OperationNotFound(operation_id.to_string()),
            other => CoreError::Upstream(other.to_string()),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            CoreError::QueryError(_) => "QUERY_ERROR",
            CoreError::OperationNotFound(_) => "OPERATION_NOT_FOUND",
            CoreError::InvalidWindow(_) => "INVALID_WINDOW",
            CoreError::InvalidTime(_) => "INVALID_TIME",
            CoreError::Upstream(_) => "UPSTREAM_ERROR",
        }
    }
}
