//! Mesh grapher - dependency graph security policy enrichment daemon
//!
//! Reads the traffic map produced by the graph builder, annotates every edge
//! with its mutual TLS share and publishes the annotated snapshot.

use anyhow::Result;
use graph_lib::{
    health::{components, HealthRegistry},
    observability::{GraphMetrics, StructuredLogger},
    AppenderPipeline, GlobalInfo,
};
use mesh_grapher::{api, config::GrapherConfig, enricher::Enricher};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GRAPHER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting mesh-grapher");

    let config = GrapherConfig::load()?;
    info!(
        instance = %config.instance,
        namespaces = ?config.namespaces,
        graph_type = %config.graph_type,
        prometheus_url = %config.prometheus_url,
        "Grapher configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_BACKEND).await;
    health_registry.register(components::GRAPH_SOURCE).await;
    health_registry.register(components::PIPELINE).await;

    let metrics = GraphMetrics::new();
    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(GRAPHER_VERSION);

    let appender = Arc::new(config.security_policy_appender());
    info!(
        excluded = ?appender.excluded_namespaces(),
        inject_service_nodes = appender.inject_service_nodes,
        "Security policy appender configured"
    );
    let pipeline = AppenderPipeline::new().with(appender.clone());
    let global = Arc::new(GlobalInfo::new(config.prom_config()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        appender,
        config.duration(),
    ));
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server failed");
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let enricher = Enricher::new(&config, pipeline, global, health_registry, logger.clone());
    let enricher_handle = tokio::spawn(enricher.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Err(e) = enricher_handle.await {
        error!(error = %e, "Enrichment loop ended abnormally");
    }
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
