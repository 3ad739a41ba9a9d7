//! Serve command - starts the API server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

use bastion_api::{ApiServer, ApiServerConfig, AppState};
use bastion_observability::install_prometheus;

use super::Connectors;
use crate::config::AppConfig;

/// Server configuration from CLI arguments.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Port to listen on.
    pub port: u16,
    /// Hostname to bind to.
    pub host: String,
    /// Enable Swagger UI.
    pub enable_swagger: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ServeConfig {
    /// Server settings from the configuration file.
    pub fn from_app_config(app_config: &AppConfig) -> Self {
        Self {
            port: app_config.server.port,
            host: app_config.server.host.clone(),
            enable_swagger: true,
            timeout_secs: app_config.server.request_timeout_secs,
        }
    }
}

/// Runs the API server.
pub async fn run_server(config: ServeConfig, app_config: AppConfig) -> Result<()> {
    println!("{} Starting BASTION API Server...", "[server]".cyan());

    println!("  {} Wazuh indexer: {}", "→".green(), app_config.indexer.url);
    println!("  {} Wazuh manager: {}", "→".green(), app_config.manager.url);
    println!("  {} Caldera: {}", "→".green(), app_config.caldera.url);
    let connectors = Connectors::from_config(&app_config)?;
    let service = connectors.service(&app_config);

    let mut state = AppState::new(service, connectors.manager.clone());
    match install_prometheus() {
        Ok(handle) => {
            state = state.with_prometheus_handle(handle);
            println!("  {} Prometheus recorder installed", "✓".green());
        }
        Err(e) => warn!(error = %e, "Prometheus recorder not installed, /metrics disabled"),
    }

    let bind_address: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    let server_config = ApiServerConfig {
        bind_address,
        request_timeout: Duration::from_secs(config.timeout_secs),
        enable_swagger: config.enable_swagger,
    };

    println!();
    println!("{}", "BASTION API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    println!("  {} {}", "Alert index:".cyan(), app_config.indexer.index);
    println!(
        "  {} {}s",
        "Match window:".cyan(),
        app_config.correlation.window_secs
    );

    if config.enable_swagger {
        println!(
            "  {} http://{}/swagger-ui",
            "Swagger UI:".cyan(),
            bind_address
        );
    }

    println!();
    println!("{}", "Endpoints:".bold());
    println!("  GET  /api/health                  - Plugin and Wazuh health");
    println!("  POST /api/correlate               - Correlate one operation");
    println!("  POST /api/dashboard/summary       - Coverage KPIs");
    println!("  GET  /operations/list             - Caldera operations");
    println!("  POST /operations/start            - Load an operation chain");
    println!("  GET  /detections                  - Per-step detections");
    println!("  GET  /api/agents                  - Agents with recent detections");
    println!("  GET  /api/alerts                  - Recent alerts by level");
    println!("  GET  /discover/indices            - Indexer indices");
    println!("  GET  /discover/search             - Ad-hoc alert search");
    println!("  GET  /plugin/bas_wazuh            - Results page");
    println!("  GET  /plugin/bas_wazuh/download   - Results as JSON");
    println!("  GET  /metrics                     - Prometheus metrics");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    let server = ApiServer::new(state, server_config);
    server.run().await.context("Server error")?;

    println!();
    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}
