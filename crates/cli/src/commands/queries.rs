//! Query inspection command

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use graph_lib::NamespaceContext;
use serde::Serialize;

use super::Settings;
use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct NamespaceQueries {
    namespace: String,
    outbound: String,
    inbound: String,
}

/// Print the two queries issued for each requested namespace
pub fn show_queries(settings: &Settings, format: OutputFormat) -> Result<()> {
    let appender = settings.security_policy_appender();
    let now = Utc::now();

    let queries: Vec<NamespaceQueries> = settings
        .namespace_infos()
        .into_iter()
        .map(|info| {
            let context = NamespaceContext::new(info.name.clone(), info.duration, now);
            NamespaceQueries {
                outbound: appender.outbound_query(&context),
                inbound: appender.inbound_query(&context),
                namespace: info.name,
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&queries)?);
        }
        OutputFormat::Table => {
            let excluded = appender.excluded_namespaces();
            if !excluded.is_empty() {
                let names: Vec<&str> = excluded.iter().map(String::as_str).collect();
                println!("{} {}", "Excluded namespaces:".bold(), names.join(", "));
                println!();
            }
            for q in &queries {
                println!("{} {}", "Namespace:".bold(), q.namespace.cyan());
                println!("  {}", "Traffic entering from other namespaces".dimmed());
                println!("  {}", q.outbound);
                println!("  {}", "Traffic originating in the namespace".dimmed());
                println!("  {}", q.inbound);
                println!();
            }
        }
    }

    Ok(())
}
