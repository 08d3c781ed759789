//! Squid - container fleet status and deployment service.
//!
//! Every instance serves its local reconciled status and can redeploy its
//! compose bundles. Instances started with a collector URL also push their
//! status there; the collector aggregates reports from the whole fleet.

mod compose;
mod config;
mod deploy;
mod reconcile;
mod registry;
mod reporter;
mod runtime;
mod web;

use config::ServerConfig;
use deploy::{CommandDeployer, DeploymentExecutor};
use registry::FleetRegistry;
use reporter::StatusReporter;
use runtime::{ContainerRuntime, DockerRuntime};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("squid=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Squid node {} on port {}...", cfg.node, cfg.http_port);
    tracing::info!("Using compose bundles from {}", cfg.compose_dir.display());

    // Container runtime client, shared by every consumer
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect(&cfg.docker_socket)?);

    // Fleet registry and its staleness sweep
    let registry = Arc::new(FleetRegistry::new());
    registry.start_sweeper(cfg.sweep_period, cfg.ttl);

    // Agent role
    if let Some(collector) = &cfg.collector {
        StatusReporter::new(collector, &cfg, runtime.clone())?.start();
    }

    let deployer = Arc::new(CommandDeployer::new(&cfg.deploy_tool, &cfg.deploy_args));
    let executor = Arc::new(DeploymentExecutor::new(deployer));

    // Start web server
    let server = Server::new(cfg, registry, runtime, executor);
    server.start().await?;

    Ok(())
}
