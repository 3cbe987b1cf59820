//! Security policy appender
//!
//! Annotates every existing edge with the share of its traffic that used
//! mutual TLS. Destination-reported request telemetry carries the
//! connection security policy, so two destination-side queries are issued
//! per namespace:
//!
//! 1. requests entering the namespace from workloads elsewhere (this keeps
//!    ingress gateway traffic even when the gateway's namespace was not
//!    requested; pairs that are not in the graph are simply ignored)
//! 2. requests leaving the namespace, minus traffic to control-plane
//!    namespaces that are not part of the graph
//!
//! Results of the second query overwrite the first on overlapping pairs.

use super::policy_rates::{EdgeKey, PolicyAggregator};
use super::{Appender, GlobalInfo, NamespaceContext};
use crate::error::GraphError;
use crate::graph::{
    exclusion_clause, is_ok, istio_system_namespaces, GraphType, NamespaceInfoMap, NodeIdentity,
    NodeKind, TrafficMap, IS_MTLS,
};
use crate::observability::GraphMetrics;
use crate::telemetry::{MetricsQuerier, Sample, Vector};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub const SECURITY_POLICY_APPENDER_NAME: &str = "securityPolicy";

const REQUESTS_METRIC: &str = "istio_requests_total";

/// Labels every sample is grouped by
pub const GROUP_BY: &str = "source_workload_namespace,source_workload,source_app,source_version,destination_service_namespace,destination_service_name,destination_workload_namespace,destination_workload,destination_app,destination_version,connection_security_policy";

/// Labels a sample must carry to be usable
struct RequestLabels<'a> {
    source_namespace: &'a str,
    source_workload: &'a str,
    source_app: &'a str,
    source_version: &'a str,
    dest_service_namespace: &'a str,
    dest_service: &'a str,
    dest_workload_namespace: &'a str,
    dest_workload: &'a str,
    dest_app: &'a str,
    dest_version: &'a str,
    policy: &'a str,
}

impl<'a> RequestLabels<'a> {
    fn from_sample(sample: &'a Sample) -> Option<Self> {
        Some(Self {
            source_namespace: sample.label("source_workload_namespace")?,
            source_workload: sample.label("source_workload")?,
            source_app: sample.label("source_app")?,
            source_version: sample.label("source_version")?,
            dest_service_namespace: sample.label("destination_service_namespace")?,
            dest_service: sample.label("destination_service_name")?,
            dest_workload_namespace: sample.label("destination_workload_namespace")?,
            dest_workload: sample.label("destination_workload")?,
            dest_app: sample.label("destination_app")?,
            dest_version: sample.label("destination_version")?,
            policy: sample.label("connection_security_policy")?,
        })
    }

    fn source(&self) -> NodeIdentity<'a> {
        NodeIdentity {
            service_namespace: self.source_namespace,
            service: "",
            workload_namespace: self.source_namespace,
            workload: self.source_workload,
            app: self.source_app,
            version: self.source_version,
        }
    }

    fn dest(&self) -> NodeIdentity<'a> {
        NodeIdentity {
            service_namespace: self.dest_service_namespace,
            service: self.dest_service,
            workload_namespace: self.dest_workload_namespace,
            workload: self.dest_workload,
            app: self.dest_app,
            version: self.dest_version,
        }
    }
}

/// Counters describing one annotation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    /// Samples returned by both queries
    pub samples: usize,
    /// Samples dropped for missing labels or invalid values
    pub skipped: usize,
    /// Samples dropped because they target an excluded namespace
    pub excluded: usize,
    /// Distinct (source, dest) pairs observed
    pub keys: usize,
    /// Edges that received an annotation
    pub edges_annotated: usize,
}

/// Adds mutual TLS percentages to graph edges
#[derive(Debug, Clone)]
pub struct SecurityPolicyAppender {
    pub graph_type: GraphType,
    pub inject_service_nodes: bool,
    pub namespaces: NamespaceInfoMap,
    excluded: BTreeSet<String>,
}

impl SecurityPolicyAppender {
    /// `namespaces` describes every namespace known to the run, `requested`
    /// the ones being graphed
    pub fn new(
        graph_type: GraphType,
        inject_service_nodes: bool,
        namespaces: NamespaceInfoMap,
        requested: &BTreeSet<String>,
    ) -> Self {
        let excluded = istio_system_namespaces(&namespaces, requested);
        Self {
            graph_type,
            inject_service_nodes,
            namespaces,
            excluded,
        }
    }

    /// Control-plane namespaces left out of the inbound query
    pub fn excluded_namespaces(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// Query window for `context`; a namespace known to the appender uses its own
    pub fn window(&self, context: &NamespaceContext) -> Duration {
        self.namespaces
            .get(&context.namespace)
            .map(|info| info.duration)
            .unwrap_or(context.duration)
    }

    /// Requests entering `namespace` from workloads in other namespaces
    pub fn outbound_query(&self, context: &NamespaceContext) -> String {
        format!(
            r#"sum(rate({}{{reporter="destination",source_workload_namespace!="{}",destination_service_namespace="{}"}}[{}s]) > 0) by ({})"#,
            REQUESTS_METRIC,
            context.namespace,
            context.namespace,
            self.window(context).as_secs(),
            GROUP_BY
        )
    }

    /// Requests originating in `namespace`, minus excluded control-plane destinations
    pub fn inbound_query(&self, context: &NamespaceContext) -> String {
        format!(
            r#"sum(rate({}{{reporter="destination",source_workload_namespace="{}"{}}}[{}s]) > 0) by ({})"#,
            REQUESTS_METRIC,
            context.namespace,
            exclusion_clause(&self.excluded),
            self.window(context).as_secs(),
            GROUP_BY
        )
    }

    /// Query the backend and annotate the edges of `traffic_map`.
    ///
    /// An empty map is left alone without querying the backend.
    pub async fn annotate(
        &self,
        traffic_map: &TrafficMap,
        context: &NamespaceContext,
        client: &dyn MetricsQuerier,
    ) -> Result<AnnotationSummary, GraphError> {
        if traffic_map.is_empty() {
            return Ok(AnnotationSummary::default());
        }
        trace!(namespace = %context.namespace, "Resolving security policy");

        let out_vector = client
            .query_vector(&self.outbound_query(context), context.query_time)
            .await?;
        let in_vector = client
            .query_vector(&self.inbound_query(context), context.query_time)
            .await?;

        let mut aggregator = PolicyAggregator::new();
        let mut summary = AnnotationSummary {
            samples: out_vector.len() + in_vector.len(),
            ..Default::default()
        };
        self.populate(&mut aggregator, &out_vector, None, &mut summary);
        self.populate(&mut aggregator, &in_vector, Some(&self.excluded), &mut summary);
        summary.keys = aggregator.len();

        summary.edges_annotated = apply_security_policy(traffic_map, &aggregator);
        Ok(summary)
    }

    /// Fold a query result into the aggregator.
    ///
    /// Samples missing any grouping label are skipped. When `excluded` is
    /// given, samples whose destination service namespace is in it are dropped.
    pub fn populate(
        &self,
        aggregator: &mut PolicyAggregator,
        vector: &Vector,
        excluded: Option<&BTreeSet<String>>,
        summary: &mut AnnotationSummary,
    ) {
        for sample in vector {
            let Some(labels) = RequestLabels::from_sample(sample) else {
                warn!(sample = %sample, "Skipping sample, missing expected labels");
                summary.skipped += 1;
                continue;
            };

            if !sample.value.is_finite() {
                warn!(sample = %sample, "Skipping sample, invalid rate");
                summary.skipped += 1;
                continue;
            }

            if excluded.is_some_and(|ex| ex.contains(labels.dest_service_namespace)) {
                summary.excluded += 1;
                continue;
            }

            let source = labels.source();
            let dest = labels.dest();

            if self.inject_service_nodes && is_ok(labels.dest_service) {
                // a service node is only injected in front of a non-service destination
                let (_, dest_kind) = dest.resolve(self.graph_type);
                if dest_kind != NodeKind::Service {
                    let service =
                        NodeIdentity::service(labels.dest_service_namespace, labels.dest_service);
                    let (policy, rate) = (labels.policy, sample.value);
                    self.add_security_policy(aggregator, policy, rate, &source, &service);
                    self.add_security_policy(aggregator, policy, rate, &service, &dest);
                    continue;
                }
            }

            self.add_security_policy(aggregator, labels.policy, sample.value, &source, &dest);
        }
    }

    fn add_security_policy(
        &self,
        aggregator: &mut PolicyAggregator,
        policy: &str,
        rate: f64,
        source: &NodeIdentity<'_>,
        dest: &NodeIdentity<'_>,
    ) {
        let (source_id, _) = source.resolve(self.graph_type);
        let (dest_id, _) = dest.resolve(self.graph_type);
        aggregator.add(EdgeKey::new(source_id, dest_id), policy, rate);
    }
}

/// Write the mutual TLS percentage onto every edge with observed rates.
///
/// Edges without observations, or whose observed total rate is zero, are left
/// untouched. Returns the number of annotated edges.
pub fn apply_security_policy(traffic_map: &TrafficMap, aggregator: &PolicyAggregator) -> usize {
    let mut annotated = 0;

    traffic_map.for_each_edge_mut(|edge| {
        let key = EdgeKey::new(edge.source.as_str(), edge.dest.as_str());
        let Some(rates) = aggregator.get(&key) else {
            return;
        };

        match rates.mtls_percentage() {
            Some(percentage) => {
                edge.metadata
                    .insert(IS_MTLS.to_string(), Value::from(percentage));
                annotated += 1;
            }
            None => debug!(edge = %key, "Zero total rate, edge left unannotated"),
        }
    });

    annotated
}

#[async_trait]
impl Appender for SecurityPolicyAppender {
    fn name(&self) -> &'static str {
        SECURITY_POLICY_APPENDER_NAME
    }

    async fn append_graph(
        &self,
        traffic_map: &TrafficMap,
        global: &GlobalInfo,
        namespace: &NamespaceContext,
    ) -> Result<(), GraphError> {
        // no client is built for an empty map
        if traffic_map.is_empty() {
            return Ok(());
        }

        let client = global.prom_client().await?;
        let summary = self.annotate(traffic_map, namespace, client.as_ref()).await?;

        let metrics = GraphMetrics::new();
        metrics.inc_samples_skipped(summary.skipped as u64);
        metrics.inc_edges_annotated(summary.edges_annotated as u64);

        info!(
            appender = SECURITY_POLICY_APPENDER_NAME,
            namespace = %namespace.namespace,
            samples = summary.samples,
            skipped = summary.skipped,
            excluded = summary.excluded,
            keys = summary.keys,
            edges_annotated = summary.edges_annotated,
            "Security policy applied"
        );
        Ok(())
    }
}
