//! HTTP API for health checks, Prometheus metrics and query inspection

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use graph_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::GraphMetrics,
    NamespaceContext, SecurityPolicyAppender,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: GraphMetrics,
    pub appender: Arc<SecurityPolicyAppender>,
    /// Query window used by the enrichment loop
    pub duration: Duration,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: GraphMetrics,
        appender: Arc<SecurityPolicyAppender>,
        duration: Duration,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            appender,
            duration,
        }
    }
}

/// Body of the query inspection endpoint
#[derive(Debug, Serialize)]
pub struct QueriesResponse {
    pub namespace: String,
    pub outbound: String,
    pub inbound: String,
    pub excluded_namespaces: Vec<String>,
}

/// 200 while operational (degraded included), 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// The two PromQL expressions the security policy appender issues for a namespace
async fn queries(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Json<QueriesResponse> {
    let context = NamespaceContext::new(namespace.clone(), state.duration, Utc::now());

    Json(QueriesResponse {
        outbound: state.appender.outbound_query(&context),
        inbound: state.appender.inbound_query(&context),
        excluded_namespaces: state.appender.excluded_namespaces().iter().cloned().collect(),
        namespace,
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/debug/queries/:namespace", get(queries))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
