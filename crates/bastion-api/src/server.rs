//! API server implementation.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::dto::{
    CorrelateRequest, DashboardRequest, HealthResponse, IndexerInput, OperationEvent,
    OperationInput, OperationListItem, OperationsListResponse, StartRequest, StartResponse,
};
use crate::error::ErrorResponse;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::routes;
use crate::state::AppState;
use crate::web;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Request timeout. Correlations fan out to the indexer and Caldera, so
    /// keep this above the indexer query timeout.
    pub request_timeout: Duration,
    /// Enable Swagger UI.
    pub enable_swagger: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(60),
            enable_swagger: true,
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::health::liveness_check,
        crate::routes::correlate::correlate,
        crate::routes::dashboard::summary,
        crate::routes::operations::list_operations,
        crate::routes::operations::start_operation,
        crate::routes::detections::detections,
        crate::routes::discover::indices,
        crate::routes::discover::search_get,
        crate::routes::discover::search_post,
        crate::routes::plugin::download,
        crate::routes::agents::agents,
        crate::routes::agents::recent_alerts,
        crate::routes::metrics::prometheus_metrics,
        crate::routes::metrics::json_metrics,
    ),
    components(
        schemas(
            HealthResponse,
            CorrelateRequest,
            DashboardRequest,
            OperationInput,
            IndexerInput,
            OperationListItem,
            OperationsListResponse,
            StartRequest,
            StartResponse,
            OperationEvent,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Plugin and dependency health"),
        (name = "Correlation", description = "Operation to alert correlation"),
        (name = "Dashboard", description = "Coverage KPIs"),
        (name = "Operations", description = "Caldera operations"),
        (name = "Detections", description = "Per-step detections"),
        (name = "Discover", description = "Ad-hoc index search"),
        (name = "Plugin", description = "Caldera plugin page helpers"),
        (name = "Agents", description = "Agent inventory and recent alerts"),
        (name = "Metrics", description = "Service metrics"),
    ),
    info(
        title = "BASTION API",
        version = "0.1.0",
        description = "Correlates Caldera adversary emulation with Wazuh detections",
        license(name = "MIT"),
    )
)]
pub struct ApiDoc;

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Creates a new API server.
    pub fn new(state: AppState, config: ApiServerConfig) -> Self {
        Self { config, state }
    }

    /// Creates a new API server with default configuration.
    pub fn with_state(state: AppState) -> Self {
        Self::new(state, ApiServerConfig::default())
    }

    /// Builds the router.
    pub fn router(&self) -> Router {
        routes::health::init_start_time();

        let mut app = routes::create_router(self.state.clone());
        app = app.merge(web::create_web_router(self.state.clone()));

        if self.config.enable_swagger {
            app = app.merge(
                SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
            );
        }

        // Innermost first.
        app.layer(middleware::from_fn(security_headers))
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                request_logging,
            ))
            .layer(middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer())
            .layer(CatchPanicLayer::new())
    }

    /// Runs the server until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs the server with a custom shutdown signal.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = self.config.bind_address;

        info!("Starting API server on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server shut down gracefully");
        Ok(())
    }
}

/// Default shutdown signal handler. A handler that cannot be installed never
/// fires; the other one still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_connectors::{MockCalderaConnector, MockIndexerConnector, MockManagerConnector};
    use bastion_core::{ChainCache, ChainLoader, CoverageService, EventStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_router_creation() {
        let service = CoverageService::new(
            EventStore::new(Arc::new(MockIndexerConnector::new("indexer"))),
            ChainLoader::new(Arc::new(MockCalderaConnector::new())),
            ChainCache::default(),
        );
        let state = AppState::new(service, Arc::new(MockManagerConnector::new("manager")));

        let server = ApiServer::with_state(state);
        let _router = server.router();
    }

    #[test]
    fn test_openapi_lists_correlation_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/correlate"));
        assert!(doc.paths.paths.contains_key("/operations/start"));
    }
}
