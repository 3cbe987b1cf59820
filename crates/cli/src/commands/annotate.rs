//! Snapshot annotation command

use anyhow::{Context, Result};
use chrono::Utc;
use graph_lib::graph::{read_snapshot, write_snapshot};
use graph_lib::telemetry::PromClientBuilder;
use graph_lib::{AppenderPipeline, GlobalInfo};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::Settings;
use crate::output::{
    edge_summaries, print_edges, print_info, print_success, print_warning, OutputFormat,
};

/// Annotate the snapshot at `input` and print or write the result
pub async fn annotate(
    settings: &Settings,
    input: &Path,
    output: Option<&Path>,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    let traffic_map = read_snapshot(input)
        .await
        .with_context(|| format!("Failed to load traffic map from {}", input.display()))?;

    if traffic_map.is_empty() && format == OutputFormat::Table {
        print_warning("Traffic map has no nodes, nothing to annotate");
    }

    let client = PromClientBuilder::new()
        .url(&settings.prom_config.url)
        .request_timeout(settings.prom_config.request_timeout)
        .build()?;
    let global = Arc::new(GlobalInfo::with_client(Arc::new(client)));
    let pipeline = AppenderPipeline::new().with(Arc::new(settings.security_policy_appender()));

    let traffic_map = Arc::new(traffic_map);
    let query_time = Utc::now();
    let start = Instant::now();
    pipeline
        .run(traffic_map.clone(), global, &settings.namespace_infos(), query_time)
        .await
        .context("Security policy annotation failed")?;
    debug!(
        elapsed_ms = start.elapsed().as_millis(),
        namespaces = ?settings.namespaces,
        "Annotation complete"
    );

    let edges = edge_summaries(&traffic_map, all);

    match output {
        Some(path) => {
            write_snapshot(&traffic_map, path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            match format {
                OutputFormat::Table => {
                    let annotated = edges.iter().filter(|e| e.is_mtls.is_some()).count();
                    print_success(&format!("Annotated traffic map written to {}", path.display()));
                    print_info(&format!(
                        "{} of {} edges annotated",
                        annotated,
                        traffic_map.edge_count()
                    ));
                }
                OutputFormat::Json => print_edges(&edges, format)?,
            }
        }
        None => print_edges(&edges, format)?,
    }

    Ok(())
}
