//! Mesh Graph CLI
//!
//! A command-line tool for annotating traffic map snapshots with security
//! policy information and inspecting the queries behind them.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{annotate, queries, show, Settings, SettingsArgs};
use graph_lib::graph::GraphType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mesh Graph CLI
#[derive(Parser)]
#[command(name = "meshgraph")]
#[command(
    author,
    version,
    about = "CLI for Mesh Graph security policy enrichment",
    long_about = None
)]
pub struct Cli {
    /// Metrics backend URL (can also be set via MESHGRAPH_PROMETHEUS_URL env var)
    #[arg(long, env = "MESHGRAPH_PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Metrics backend request timeout in seconds
    #[arg(long)]
    pub query_timeout_secs: Option<u64>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Annotate a traffic map snapshot with mTLS percentages
    Annotate {
        /// Base traffic map snapshot
        #[arg(long, short)]
        input: PathBuf,

        /// Namespaces to annotate (repeatable or comma separated)
        #[arg(long = "namespace", short = 'n', required = true, value_delimiter = ',')]
        namespaces: Vec<String>,

        /// Query window in seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Graph type the snapshot was built with
        #[arg(long)]
        graph_type: Option<GraphType>,

        /// Attribute traffic directly to workloads instead of through service nodes
        #[arg(long)]
        no_inject_service_nodes: bool,

        /// Mesh control-plane namespaces
        #[arg(long = "istio-namespace", value_delimiter = ',')]
        istio_namespaces: Vec<String>,

        /// Write the annotated snapshot here instead of printing edges
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Also list edges without observed traffic
        #[arg(long)]
        all: bool,
    },

    /// Print the PromQL queries issued for a namespace
    Queries {
        /// Namespaces to render (repeatable or comma separated)
        #[arg(long = "namespace", short = 'n', required = true, value_delimiter = ',')]
        namespaces: Vec<String>,

        /// Query window in seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Mesh control-plane namespaces
        #[arg(long = "istio-namespace", value_delimiter = ',')]
        istio_namespaces: Vec<String>,
    },

    /// Show the edges of an annotated snapshot
    Show {
        /// Annotated traffic map snapshot
        input: PathBuf,

        /// Also list edges without an annotation
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let defaults = config::Config::load()?;

    match cli.command {
        Commands::Annotate {
            input,
            namespaces,
            duration_secs,
            graph_type,
            no_inject_service_nodes,
            istio_namespaces,
            output,
            all,
        } => {
            let settings = Settings::resolve(
                &defaults,
                SettingsArgs {
                    prometheus_url: cli.prometheus_url,
                    query_timeout_secs: cli.query_timeout_secs,
                    namespaces,
                    duration_secs,
                    graph_type,
                    inject_service_nodes: !no_inject_service_nodes,
                    istio_namespaces,
                },
            )?;
            annotate::annotate(&settings, &input, output.as_deref(), all, cli.format).await?;
        }
        Commands::Queries {
            namespaces,
            duration_secs,
            istio_namespaces,
        } => {
            let settings = Settings::resolve(
                &defaults,
                SettingsArgs {
                    prometheus_url: cli.prometheus_url,
                    query_timeout_secs: cli.query_timeout_secs,
                    namespaces,
                    duration_secs,
                    graph_type: None,
                    inject_service_nodes: true,
                    istio_namespaces,
                },
            )?;
            queries::show_queries(&settings, cli.format)?;
        }
        Commands::Show { input, all } => {
            show::show_edges(&input, all, cli.format).await?;
        }
    }

    Ok(())
}
