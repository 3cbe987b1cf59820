//! Node identity resolution
//!
//! Folds the telemetry attributes reported for one side of a request
//! (namespace, workload, app, version, service) into the canonical node ID
//! used by the traffic map. The same logical node is reached from several
//! independent queries, so resolution must be a pure function of its inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value reported by telemetry when an attribute could not be determined
pub const UNKNOWN: &str = "unknown";

/// Graph flavor requested by the caller; selects how nodes are keyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphType {
    /// One node per application, versions collapsed
    App,
    /// One node per application version
    VersionedApp,
    /// One node per workload
    #[default]
    Workload,
    /// Service graph (built as a workload graph, then reduced)
    Service,
}

impl GraphType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphType::App => "app",
            GraphType::VersionedApp => "versionedApp",
            GraphType::Workload => "workload",
            GraphType::Service => "service",
        }
    }

    /// Workload and service graphs key nodes by workload name
    fn keyed_by_workload(&self) -> bool {
        matches!(self, GraphType::Workload | GraphType::Service)
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(GraphType::App),
            "versionedApp" | "versioned_app" => Ok(GraphType::VersionedApp),
            "workload" => Ok(GraphType::Workload),
            "service" => Ok(GraphType::Service),
            other => Err(format!("unknown graph type: {}", other)),
        }
    }
}

/// Classification of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    App,
    Service,
    Workload,
    Unknown,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::App => "app",
            NodeKind::Service => "service",
            NodeKind::Workload => "workload",
            NodeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if a telemetry attribute carries a usable value
pub fn is_ok(value: &str) -> bool {
    !value.is_empty() && value != UNKNOWN
}

/// Borrowed attribute tuple describing one side of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeIdentity<'a> {
    pub service_namespace: &'a str,
    pub service: &'a str,
    pub workload_namespace: &'a str,
    pub workload: &'a str,
    pub app: &'a str,
    pub version: &'a str,
}

impl<'a> NodeIdentity<'a> {
    /// Identity of a plain service node
    pub fn service(namespace: &'a str, service: &'a str) -> Self {
        Self {
            service_namespace: namespace,
            service,
            ..Default::default()
        }
    }

    /// Identity of a workload-backed node, optionally fronted by a service
    pub fn workload(
        namespace: &'a str,
        service: &'a str,
        workload: &'a str,
        app: &'a str,
        version: &'a str,
    ) -> Self {
        Self {
            service_namespace: namespace,
            service,
            workload_namespace: namespace,
            workload,
            app,
            version,
        }
    }

    /// Resolve the canonical node ID and kind for the given graph type
    pub fn resolve(&self, graph_type: GraphType) -> (String, NodeKind) {
        // prefer the workload namespace
        let namespace = if is_ok(self.workload_namespace) {
            self.workload_namespace
        } else {
            self.service_namespace
        };

        if namespace == UNKNOWN
            && self.workload == UNKNOWN
            && self.app == UNKNOWN
            && self.service.is_empty()
        {
            return ("unknown_source".to_string(), NodeKind::Unknown);
        }

        // Requests to an unknown destination (e.g. a bad ingress path) collapse
        // into one unknown service per namespace
        if self.workload == UNKNOWN && self.app == UNKNOWN && self.service == UNKNOWN {
            return (format!("svc_{}_unknown", namespace), NodeKind::Service);
        }

        let workload_ok = is_ok(self.workload);
        let app_ok = is_ok(self.app);
        let service_ok = is_ok(self.service);
        let version_ok = is_ok(self.version);

        if !workload_ok && !app_ok && !service_ok {
            return (format!("unknown_{}", namespace), NodeKind::Unknown);
        }

        let workload_node = || (format!("wl_{}_{}", namespace, self.workload), NodeKind::Workload);
        let service_node = || (format!("svc_{}_{}", namespace, self.service), NodeKind::Service);

        match (graph_type.keyed_by_workload(), app_ok, workload_ok, service_ok) {
            (true, _, true, _) => workload_node(),
            (true, _, false, true) => service_node(),
            // app is the only usable attribute in a workload-keyed graph
            (true, _, false, false) => (format!("unknown_{}", namespace), NodeKind::Unknown),
            (false, true, _, _) if graph_type == GraphType::App || !version_ok => {
                (format!("app_{}_{}", namespace, self.app), NodeKind::App)
            }
            (false, true, true, _) => {
                (format!("vapp_{}_{}", namespace, self.workload), NodeKind::App)
            }
            (false, true, false, _) => (
                format!("vapp_{}_{}_{}", namespace, self.app, self.version),
                NodeKind::App,
            ),
            (false, false, true, _) => workload_node(),
            (false, false, false, _) => service_node(),
        }
    }
}

/// Resolve a node ID from individual telemetry attributes
pub fn node_id(
    service_namespace: &str,
    service: &str,
    workload_namespace: &str,
    workload: &str,
    app: &str,
    version: &str,
    graph_type: GraphType,
) -> (String, NodeKind) {
    NodeIdentity {
        service_namespace,
        service,
        workload_namespace,
        workload,
        app,
        version,
    }
    .resolve(graph_type)
}
