//! Appender pipeline driver
//!
//! Runs the ordered appender list once per namespace. Namespaces are
//! processed concurrently against the same traffic map; the first error
//! aborts every remaining task and is returned to the caller.

use super::{Appender, GlobalInfo, NamespaceContext};
use crate::error::GraphError;
use crate::graph::{NamespaceInfo, TrafficMap};
use crate::observability::GraphMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Ordered list of appenders
#[derive(Clone, Default)]
pub struct AppenderPipeline {
    appenders: Vec<Arc<dyn Appender>>,
}

impl AppenderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage to the end of the pipeline
    pub fn with(mut self, appender: Arc<dyn Appender>) -> Self {
        self.appenders.push(appender);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.appenders.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.appenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appenders.is_empty()
    }

    /// Run every appender for every namespace at the fixed `query_time`
    pub async fn run(
        &self,
        traffic_map: Arc<TrafficMap>,
        global: Arc<GlobalInfo>,
        namespaces: &[NamespaceInfo],
        query_time: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let metrics = GraphMetrics::new();
        let mut tasks = JoinSet::new();

        for info in namespaces {
            let appenders = self.appenders.clone();
            let traffic_map = traffic_map.clone();
            let global = global.clone();
            let metrics = metrics.clone();
            let context = NamespaceContext::new(info.name.clone(), info.duration, query_time);

            tasks.spawn(async move {
                for appender in &appenders {
                    let start = Instant::now();
                    if let Err(e) = appender
                        .append_graph(&traffic_map, &global, &context)
                        .await
                    {
                        warn!(
                            appender = appender.name(),
                            namespace = %context.namespace,
                            error = %e,
                            "Appender failed"
                        );
                        return Err(e);
                    }
                    let elapsed = start.elapsed();
                    metrics.observe_appender_latency(appender.name(), elapsed.as_secs_f64());
                    debug!(
                        appender = appender.name(),
                        namespace = %context.namespace,
                        elapsed_ms = elapsed.as_millis(),
                        "Appender complete"
                    );
                }
                Ok(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(GraphError::Task(e.to_string())),
            };
            if let Err(e) = result {
                tasks.abort_all();
                return Err(e);
            }
        }

        Ok(())
    }
}
