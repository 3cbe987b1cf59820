//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use graph_lib::graph::{TrafficMap, IS_MTLS};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One edge and its mutual TLS share
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSummary {
    pub source: String,
    pub dest: String,
    #[serde(rename = "isMTLS", skip_serializing_if = "Option::is_none")]
    pub is_mtls: Option<f64>,
}

#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    dest: String,
    #[tabled(rename = "mTLS")]
    mtls: String,
}

/// Edges of `map` ordered by source then destination.
///
/// Unannotated edges are included only when `all` is set.
pub fn edge_summaries(map: &TrafficMap, all: bool) -> Vec<EdgeSummary> {
    let mut edges: Vec<EdgeSummary> = map
        .snapshot()
        .into_iter()
        .flat_map(|node| node.edges)
        .map(|edge| EdgeSummary {
            is_mtls: edge.metadata_f64(IS_MTLS),
            source: edge.source,
            dest: edge.dest,
        })
        .filter(|edge| all || edge.is_mtls.is_some())
        .collect();
    edges.sort_by(|a, b| (&a.source, &a.dest).cmp(&(&b.source, &b.dest)));
    edges
}

/// Print edges as a table or JSON
pub fn print_edges(edges: &[EdgeSummary], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if edges.is_empty() {
                println!("{}", "No annotated edges".yellow());
                return Ok(());
            }
            let rows: Vec<EdgeRow> = edges
                .iter()
                .map(|edge| EdgeRow {
                    source: edge.source.clone(),
                    dest: edge.dest.clone(),
                    mtls: color_mtls(edge.is_mtls),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(edges)?);
        }
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_mtls(percentage: Option<f64>) -> String {
    match percentage {
        Some(p) if p.fract() == 0.0 => format!("{:.0}%", p),
        Some(p) => format!("{:.1}%", p),
        None => "-".to_string(),
    }
}

/// Green when fully encrypted, red when plaintext only
pub fn color_mtls(percentage: Option<f64>) -> String {
    let formatted = format_mtls(percentage);
    match percentage {
        Some(p) if p >= 100.0 => formatted.green().to_string(),
        Some(p) if p > 0.0 => formatted.yellow().to_string(),
        Some(_) => formatted.red().to_string(),
        None => formatted.dimmed().to_string(),
    }
}
