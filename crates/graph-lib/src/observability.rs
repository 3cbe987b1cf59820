//! Observability infrastructure for graph enrichment
//!
//! Provides:
//! - Prometheus metrics (appender latency, backend query latency, skipped samples, annotated edges)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GraphMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct GraphMetricsInner {
    appender_duration_seconds: HistogramVec,
    query_duration_seconds: Histogram,
    samples_skipped: IntCounter,
    edges_annotated: IntCounter,
    pipeline_runs: IntCounterVec,
    graph_nodes: IntGauge,
}

impl GraphMetricsInner {
    fn new() -> Self {
        Self {
            appender_duration_seconds: register_histogram_vec!(
                "mesh_graph_appender_duration_seconds",
                "Time spent running one appender for one namespace",
                &["appender"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register appender_duration_seconds"),

            query_duration_seconds: register_histogram!(
                "mesh_graph_query_duration_seconds",
                "Time spent waiting on the metrics backend per query",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_duration_seconds"),

            samples_skipped: register_int_counter!(
                "mesh_graph_samples_skipped_total",
                "Telemetry samples discarded because of missing labels or invalid values"
            )
            .expect("Failed to register samples_skipped"),

            edges_annotated: register_int_counter!(
                "mesh_graph_edges_annotated_total",
                "Graph edges that received a security policy annotation"
            )
            .expect("Failed to register edges_annotated"),

            pipeline_runs: register_int_counter_vec!(
                "mesh_graph_pipeline_runs_total",
                "Completed appender pipeline runs by result",
                &["result"]
            )
            .expect("Failed to register pipeline_runs"),

            graph_nodes: register_int_gauge!(
                "mesh_graph_nodes",
                "Number of nodes in the most recently enriched traffic map"
            )
            .expect("Failed to register graph_nodes"),
        }
    }
}

/// Graph enrichment metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GraphMetrics {
    _private: (),
}

impl Default for GraphMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GraphMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GraphMetricsInner {
        GLOBAL_METRICS.get_or_init(GraphMetricsInner::new)
    }

    pub fn observe_appender_latency(&self, appender: &str, duration_secs: f64) {
        self.inner()
            .appender_duration_seconds
            .with_label_values(&[appender])
            .observe(duration_secs);
    }

    pub fn observe_query_latency(&self, duration_secs: f64) {
        self.inner().query_duration_seconds.observe(duration_secs);
    }

    pub fn inc_samples_skipped(&self, count: u64) {
        self.inner().samples_skipped.inc_by(count);
    }

    pub fn inc_edges_annotated(&self, count: u64) {
        self.inner().edges_annotated.inc_by(count);
    }

    /// Record a finished pipeline run ("ok" or an error kind)
    pub fn inc_pipeline_runs(&self, result: &str) {
        self.inner()
            .pipeline_runs
            .with_label_values(&[result])
            .inc();
    }

    pub fn set_graph_nodes(&self, count: i64) {
        self.inner().graph_nodes.set(count);
    }

    pub fn pipeline_runs(&self, result: &str) -> u64 {
        self.inner()
            .pipeline_runs
            .with_label_values(&[result])
            .get()
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log the start of a pipeline run
    pub fn log_run_started(&self, namespaces: &[String], query_time: i64, appenders: &[&str]) {
        info!(
            event = "pipeline_started",
            instance = %self.instance,
            namespaces = ?namespaces,
            query_time = query_time,
            appenders = ?appenders,
            "Graph enrichment run started"
        );
    }

    /// Log the end of a pipeline run
    pub fn log_run_finished(&self, nodes: usize, edges: usize, elapsed_ms: u128) {
        info!(
            event = "pipeline_finished",
            instance = %self.instance,
            nodes = nodes,
            edges = edges,
            elapsed_ms = elapsed_ms,
            "Graph enrichment run finished"
        );
    }

    /// Log an aborted pipeline run
    pub fn log_run_failed(&self, error: &str) {
        warn!(
            event = "pipeline_failed",
            instance = %self.instance,
            error = %error,
            "Graph enrichment run aborted"
        );
    }

    /// Log a written snapshot
    pub fn log_snapshot_written(&self, path: &str, nodes: usize) {
        info!(
            event = "snapshot_written",
            instance = %self.instance,
            path = %path,
            nodes = nodes,
            "Annotated traffic map written"
        );
    }

    /// Log startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "grapher_started",
            instance = %self.instance,
            version = %version,
            "Mesh grapher started"
        );
    }

    /// Log shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "grapher_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Mesh grapher shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_metrics_creation() {
        let metrics = GraphMetrics::new();

        metrics.observe_appender_latency("securityPolicy", 0.01);
        metrics.observe_query_latency(0.002);
        metrics.inc_samples_skipped(2);
        metrics.inc_edges_annotated(3);
        metrics.set_graph_nodes(12);

        let before = metrics.pipeline_runs("test_result");
        metrics.inc_pipeline_runs("test_result");
        assert_eq!(metrics.pipeline_runs("test_result"), before + 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
