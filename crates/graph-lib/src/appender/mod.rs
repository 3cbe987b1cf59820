//! Graph appenders
//!
//! An appender enriches an already-built traffic map with one dimension of
//! derived information. Appenders run in order, once per requested
//! namespace, through the [`AppenderPipeline`].

mod pipeline;
mod policy_rates;
mod security_policy;


pub use pipeline::AppenderPipeline;
pub use policy_rates::{EdgeKey, PolicyAggregator, PolicyRates, POLICY_MTLS};
pub use security_policy::{
    apply_security_policy, AnnotationSummary, SecurityPolicyAppender, GROUP_BY,
    SECURITY_POLICY_APPENDER_NAME,
};

use crate::error::GraphError;
use crate::graph::TrafficMap;
use crate::telemetry::{MetricsQuerier, PromClient, PromClientConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

/// State shared by every appender invocation in one pipeline run
pub struct GlobalInfo {
    prom_config: PromClientConfig,
    prom_client: OnceCell<Arc<dyn MetricsQuerier>>,
}

impl GlobalInfo {
    /// Create global state; the metrics client is built lazily on first use
    pub fn new(prom_config: PromClientConfig) -> Self {
        Self {
            prom_config,
            prom_client: OnceCell::new(),
        }
    }

    /// Create global state around an existing metrics client
    pub fn with_client(client: Arc<dyn MetricsQuerier>) -> Self {
        Self {
            prom_config: PromClientConfig::default(),
            prom_client: OnceCell::new_with(Some(client)),
        }
    }

    /// Shared metrics client, constructed exactly once even under concurrent first use
    pub async fn prom_client(&self) -> Result<Arc<dyn MetricsQuerier>, GraphError> {
        let client = self
            .prom_client
            .get_or_try_init(|| async {
                let client = PromClient::new(&self.prom_config)?;
                info!(url = %client.base_url(), "Metrics backend client initialized");
                Ok::<Arc<dyn MetricsQuerier>, GraphError>(Arc::new(client))
            })
            .await?;
        Ok(client.clone())
    }

    pub fn has_client(&self) -> bool {
        self.prom_client.initialized()
    }
}

/// Per-namespace parameters for one appender invocation
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceContext {
    pub namespace: String,
    /// Range of the rate queries
    pub duration: Duration,
    /// Evaluation instant, fixed once per pipeline run
    pub query_time: DateTime<Utc>,
}

impl NamespaceContext {
    pub fn new(
        namespace: impl Into<String>,
        duration: Duration,
        query_time: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            duration,
            query_time,
        }
    }
}

/// A stage that annotates an existing traffic map
#[async_trait]
pub trait Appender: Send + Sync {
    /// Stable identifier used for logging and ordering
    fn name(&self) -> &'static str;

    /// Enrich `traffic_map` for one namespace. Errors abort the whole run.
    async fn append_graph(
        &self,
        traffic_map: &TrafficMap,
        global: &GlobalInfo,
        namespace: &NamespaceContext,
    ) -> Result<(), GraphError>;
}
