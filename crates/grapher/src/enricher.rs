//! Enrichment loop
//!
//! Each tick loads the base traffic map, runs the appender pipeline once for
//! every configured namespace at a single query instant, and writes the
//! annotated snapshot. A failed run leaves the previous output in place.

use crate::config::GrapherConfig;
use chrono::Utc;
use graph_lib::{
    graph::{read_snapshot, write_snapshot, NamespaceInfo},
    health::{components, HealthRegistry},
    observability::{GraphMetrics, StructuredLogger},
    AppenderPipeline, GlobalInfo, GraphError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Outcome of one successful enrichment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub nodes: usize,
    pub edges: usize,
    pub elapsed: Duration,
}

/// Periodic driver of the appender pipeline
pub struct Enricher {
    input_path: PathBuf,
    output_path: PathBuf,
    namespaces: Vec<NamespaceInfo>,
    refresh_interval: Duration,
    pipeline: AppenderPipeline,
    global: Arc<GlobalInfo>,
    health: HealthRegistry,
    metrics: GraphMetrics,
    logger: StructuredLogger,
}

impl Enricher {
    pub fn new(
        config: &GrapherConfig,
        pipeline: AppenderPipeline,
        global: Arc<GlobalInfo>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            input_path: config.input_path.clone(),
            output_path: config.output_path.clone(),
            namespaces: config.requested_namespaces(),
            refresh_interval: config.refresh_interval(),
            pipeline,
            global,
            health,
            metrics: GraphMetrics::new(),
            logger,
        }
    }

    /// Run the pipeline once and record the outcome
    pub async fn tick(&self) -> Result<RunReport, GraphError> {
        match self.run_once().await {
            Ok(report) => {
                self.health.record_run_success().await;
                self.metrics.inc_pipeline_runs("ok");
                self.metrics.set_graph_nodes(report.nodes as i64);
                Ok(report)
            }
            Err(e) => {
                self.health.record_run_failure(e.to_string()).await;
                self.metrics.inc_pipeline_runs(e.kind());
                self.logger.log_run_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Load, enrich and write one snapshot
    pub async fn run_once(&self) -> Result<RunReport, GraphError> {
        let start = Instant::now();

        let traffic_map = match read_snapshot(&self.input_path).await {
            Ok(map) => {
                self.health.set_healthy(components::GRAPH_SOURCE).await;
                Arc::new(map)
            }
            Err(e) => {
                self.health
                    .set_unhealthy(components::GRAPH_SOURCE, e.to_string())
                    .await;
                return Err(e);
            }
        };

        let query_time = Utc::now();
        let names: Vec<String> = self.namespaces.iter().map(|ns| ns.name.clone()).collect();
        self.logger
            .log_run_started(&names, query_time.timestamp(), &self.pipeline.names());

        if let Err(e) = self
            .pipeline
            .run(traffic_map.clone(), self.global.clone(), &self.namespaces, query_time)
            .await
        {
            if is_backend_error(&e) {
                self.health
                    .set_unhealthy(components::METRICS_BACKEND, e.to_string())
                    .await;
            }
            return Err(e);
        }
        if self.global.has_client() {
            self.health.set_healthy(components::METRICS_BACKEND).await;
        }

        write_snapshot(&traffic_map, &self.output_path).await?;
        self.logger
            .log_snapshot_written(&self.output_path.display().to_string(), traffic_map.len());

        let report = RunReport {
            nodes: traffic_map.len(),
            edges: traffic_map.edge_count(),
            elapsed: start.elapsed(),
        };
        self.logger
            .log_run_finished(report.nodes, report.edges, report.elapsed.as_millis());
        Ok(report)
    }

    /// Run until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.refresh_interval.as_secs(),
            namespaces = self.namespaces.len(),
            "Starting enrichment loop"
        );

        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Ok(report) = self.tick().await {
                        debug!(
                            nodes = report.nodes,
                            edges = report.edges,
                            elapsed_ms = report.elapsed.as_millis(),
                            "Enrichment cycle complete"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down enrichment loop");
                    break;
                }
            }
        }
    }
}

fn is_backend_error(error: &GraphError) -> bool {
    matches!(
        error,
        GraphError::MetricsClient(_)
            | GraphError::Query { .. }
            | GraphError::Backend(_)
            | GraphError::Decode(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_classification() {
        assert!(is_backend_error(&GraphError::backend("bad_data")));
        assert!(is_backend_error(&GraphError::metrics_client("invalid url")));
        assert!(!is_backend_error(&GraphError::snapshot("missing file")));
        assert!(!is_backend_error(&GraphError::Task("panicked".to_string())));
    }
}
