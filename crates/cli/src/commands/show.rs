//! Snapshot inspection command

use anyhow::{Context, Result};
use graph_lib::graph::read_snapshot;
use std::path::Path;

use crate::output::{edge_summaries, print_edges, OutputFormat};

/// Print the annotated edges of a snapshot
pub async fn show_edges(input: &Path, all: bool, format: OutputFormat) -> Result<()> {
    let traffic_map = read_snapshot(input)
        .await
        .with_context(|| format!("Failed to load traffic map from {}", input.display()))?;

    print_edges(&edge_summaries(&traffic_map, all), format)
}
