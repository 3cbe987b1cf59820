//! Graph library for mesh dependency graph enrichment
//!
//! This crate provides the core functionality for:
//! - Canonical node identity and the shared traffic map
//! - Querying the metrics backend for request telemetry
//! - Appender pipeline and the security policy (mTLS) appender
//! - Health checks and observability

pub mod appender;
pub mod error;
pub mod graph;
pub mod health;
pub mod observability;
pub mod telemetry;

pub use appender::{
    Appender, AppenderPipeline, GlobalInfo, NamespaceContext, SecurityPolicyAppender,
};
pub use error::GraphError;
pub use graph::{GraphType, NodeKind, TrafficMap};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{GraphMetrics, StructuredLogger};
