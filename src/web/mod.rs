//! Web server module.

mod auth;
mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::deploy::DeploymentExecutor;
use crate::registry::FleetRegistry;
use crate::runtime::ContainerRuntime;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<FleetRegistry>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub executor: Arc<DeploymentExecutor>,
}

/// Web server for Squid.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        registry: Arc<FleetRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        executor: Arc<DeploymentExecutor>,
    ) -> Self {
        Self::from_state(AppState {
            config,
            registry,
            runtime,
            executor,
        })
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        let api = Router::new()
            .route("/nodes/status/{host}", post(handlers::handle_collect_status))
            .route("/nodes/status", get(handlers::handle_get_statuses))
            .route("/compose/status", get(handlers::handle_compose_status))
            .route("/compose/plan", get(handlers::handle_compose_plan))
            .route("/compose/up", get(handlers::handle_compose_up))
            .route("/containers", get(handlers::handle_containers))
            .route("/executions", get(handlers::handle_executions))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::require_basic_auth,
            ));

        Router::new()
            .route("/", get(handlers::handle_root))
            .route("/status", get(handlers::handle_status))
            .route("/get", get(handlers::handle_get_script))
            .route("/favicon.ico", get(handlers::handle_favicon))
            .nest("/api", api)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
