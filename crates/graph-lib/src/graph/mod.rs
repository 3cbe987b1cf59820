//! Mesh dependency graph model
//!
//! This module provides:
//! - Canonical node identity resolution from telemetry labels
//! - The shared traffic map mutated by appenders
//! - Namespace window parameters and control-plane exclusion
//! - Snapshot file IO for base and annotated graphs

mod identity;
mod namespaces;
mod traffic_map;

pub use identity::{is_ok, node_id, GraphType, NodeIdentity, NodeKind, UNKNOWN};
pub use namespaces::{
    exclusion_clause, istio_system_namespaces, namespace_info_map, NamespaceInfo,
    NamespaceInfoMap, DEFAULT_DURATION,
};
pub use traffic_map::{Edge, Metadata, Node, TrafficMap};

use crate::error::GraphError;
use std::path::Path;
use tracing::info;

/// Edge metadata key holding the percentage of traffic sent with mutual TLS
pub const IS_MTLS: &str = "isMTLS";

/// Load a traffic map snapshot (a JSON array of nodes)
pub async fn read_snapshot(path: &Path) -> Result<TrafficMap, GraphError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| GraphError::snapshot(format!("failed to read {:?}: {}", path, e)))?;
    let map: TrafficMap = serde_json::from_slice(&bytes)
        .map_err(|e| GraphError::snapshot(format!("invalid snapshot {:?}: {}", path, e)))?;
    map.prune_dangling_edges();

    info!(
        path = %path.display(),
        nodes = map.len(),
        edges = map.edge_count(),
        "Loaded traffic map snapshot"
    );
    Ok(map)
}

/// Write a traffic map snapshot, replacing the file atomically
pub async fn write_snapshot(map: &TrafficMap, path: &Path) -> Result<(), GraphError> {
    let json = serde_json::to_vec_pretty(map)
        .map_err(|e| GraphError::snapshot(format!("failed to serialize traffic map: {}", e)))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| GraphError::snapshot(format!("failed to write {:?}: {}", tmp, e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| GraphError::snapshot(format!("failed to replace {:?}: {}", path, e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("graph.json");

        let map = TrafficMap::new();
        let a = map.add_node(&NodeIdentity::service("bookinfo", "details"), GraphType::Workload);
        let b = map.add_node(
            &NodeIdentity::workload("bookinfo", "details", "details-v1", "details", "v1"),
            GraphType::Workload,
        );
        map.add_edge(&a, &b);

        write_snapshot(&map, &path).await.unwrap();
        let loaded = read_snapshot(&path).await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded.has_edge(&a, &b));
    }

    #[tokio::test]
    async fn test_read_missing_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let result = read_snapshot(&temp_dir.path().join("missing.json")).await;
        assert!(matches!(result, Err(GraphError::Snapshot(_))));
    }

    #[tokio::test]
    async fn test_write_failure_is_snapshot_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("graph.json");

        let map = TrafficMap::new();
        map.add_node(&NodeIdentity::service("bookinfo", "details"), GraphType::Workload);

        let err = write_snapshot(&map, &path).await.unwrap_err();
        assert_eq!(err.kind(), "snapshot");
        assert!(!path.exists());
    }
}
