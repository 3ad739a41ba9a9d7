//! Check command - checks the indexer, manager and Caldera.

use anyhow::{bail, Result};
use bastion_connectors::{Connector, ConnectorHealth, ConnectorResult};
use colored::Colorize;
use serde::Serialize;

use super::Connectors;
use crate::config::AppConfig;
use crate::OutputFormat;

#[derive(Debug, Serialize)]
struct DependencyStatus {
    name: String,
    url: String,
    status: &'static str,
    detail: Option<String>,
}

impl DependencyStatus {
    fn new(name: &str, url: &str, health: ConnectorResult<ConnectorHealth>) -> Self {
        let (status, detail) = match health {
            Ok(ConnectorHealth::Degraded(msg)) => ("degraded", Some(msg)),
            Ok(ConnectorHealth::Unhealthy(msg)) => ("unhealthy", Some(msg)),
            Ok(h) => (h.label(), None),
            Err(e) => ("unreachable", Some(e.to_string())),
        };
        Self {
            name: name.to_string(),
            url: url.to_string(),
            status,
            detail,
        }
    }

    fn is_ok(&self) -> bool {
        matches!(self.status, "healthy" | "degraded")
    }
}

/// Checks connectivity to every configured dependency.
pub async fn run_check(config: AppConfig, format: OutputFormat) -> Result<()> {
    let connectors = Connectors::from_config(&config)?;

    let (indexer, manager, caldera) = tokio::join!(
        connectors.indexer.health_check(),
        connectors.manager.health_check(),
        connectors.caldera.health_check(),
    );
    let statuses = vec![
        DependencyStatus::new("wazuh-indexer", &config.indexer.url, indexer),
        DependencyStatus::new("wazuh-manager", &config.manager.url, manager),
        DependencyStatus::new("caldera", &config.caldera.url, caldera),
    ];

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{}", "Dependency Check".bold());
        println!("─────────────────────");
        for s in &statuses {
            let status = match s.status {
                "healthy" => s.status.green(),
                "degraded" => s.status.yellow(),
                _ => s.status.red(),
            };
            println!("  {:<14} {:<10} {}", s.name, status, s.url);
            if let Some(detail) = &s.detail {
                println!("  {:<14} {}", "", detail.dimmed());
            }
        }
    }

    let failed = statuses.iter().filter(|s| !s.is_ok()).count();
    if failed > 0 {
        bail!("{} of {} dependencies are not reachable", failed, statuses.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_connectors::ConnectorError;

    #[test]
    fn test_dependency_status() {
        let ok = DependencyStatus::new("caldera", "http://c", Ok(ConnectorHealth::Healthy));
        assert_eq!(ok.status, "healthy");
        assert!(ok.is_ok());

        let slow = DependencyStatus::new(
            "wazuh-indexer",
            "https://i",
            Ok(ConnectorHealth::Degraded("cluster yellow".into())),
        );
        assert!(slow.is_ok());
        assert_eq!(slow.detail.as_deref(), Some("cluster yellow"));

        let down = DependencyStatus::new(
            "wazuh-manager",
            "https://m",
            Err(ConnectorError::ConnectionFailed("refused".into())),
        );
        assert_eq!(down.status, "unreachable");
        assert!(!down.is_ok());
    }
}
