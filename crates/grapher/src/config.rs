//! Grapher configuration

use anyhow::{Context, Result};
use graph_lib::graph::{namespace_info_map, GraphType, NamespaceInfo, NamespaceInfoMap};
use graph_lib::telemetry::PromClientConfig;
use graph_lib::SecurityPolicyAppender;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Grapher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GrapherConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Metrics backend base URL
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Base traffic map snapshot produced by the graph builder
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Where the annotated snapshot is written
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Namespaces to enrich
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Query window in seconds
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub graph_type: GraphType,

    #[serde(default = "default_inject_service_nodes")]
    pub inject_service_nodes: bool,

    /// Mesh control-plane namespaces
    #[serde(default = "default_istio_namespaces")]
    pub istio_namespaces: Vec<String>,
}

fn default_instance() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "mesh-grapher".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_prometheus_url() -> String {
    PromClientConfig::default().url
}

fn default_query_timeout() -> u64 {
    30
}

fn default_input_path() -> PathBuf {
    PathBuf::from("/var/lib/mesh-grapher/traffic-map.json")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("/var/lib/mesh-grapher/traffic-map.annotated.json")
}

fn default_duration() -> u64 {
    600
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_inject_service_nodes() -> bool {
    true
}

fn default_istio_namespaces() -> Vec<String> {
    vec!["istio-system".to_string()]
}

impl GrapherConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("GRAPHER_CONFIG_FILE").ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load configuration, reading `file` (or `mesh-grapher.*` in the working
    /// directory) before `GRAPHER_*` environment variables
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::with_name("mesh-grapher").required(false),
        };

        let config = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix("GRAPHER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("namespaces")
                    .with_list_parse_key("istio_namespaces"),
            )
            .build()
            .context("Failed to read grapher configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid grapher configuration")?;

        if config.namespaces.is_empty() {
            anyhow::bail!("at least one namespace must be configured (GRAPHER_NAMESPACES)");
        }
        Ok(config)
    }

    pub fn prom_config(&self) -> PromClientConfig {
        PromClientConfig {
            url: self.prometheus_url.clone(),
            request_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Every namespace known to the run, control-plane namespaces flagged
    pub fn namespace_map(&self) -> NamespaceInfoMap {
        namespace_info_map(&self.namespaces, &self.istio_namespaces, self.duration())
    }

    pub fn requested(&self) -> BTreeSet<String> {
        self.namespaces.iter().cloned().collect()
    }

    /// Namespaces the pipeline runs for
    pub fn requested_namespaces(&self) -> Vec<NamespaceInfo> {
        let map = self.namespace_map();
        self.requested()
            .iter()
            .filter_map(|name| map.get(name).cloned())
            .collect()
    }

    pub fn security_policy_appender(&self) -> SecurityPolicyAppender {
        SecurityPolicyAppender::new(
            self.graph_type,
            self.inject_service_nodes,
            self.namespace_map(),
            &self.requested(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("grapher.toml");
        std::fs::write(
            &path,
            r#"
prometheus_url = "http://prometheus:9090"
namespaces = ["bookinfo", "shop"]
graph_type = "versionedApp"
inject_service_nodes = false
duration_secs = 300
"#,
        )
        .unwrap();

        let config = GrapherConfig::load_from(Some(&path)).unwrap();

        assert_eq!(config.prometheus_url, "http://prometheus:9090");
        assert_eq!(config.graph_type, GraphType::VersionedApp);
        assert!(!config.inject_service_nodes);
        assert_eq!(config.duration(), Duration::from_secs(300));
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.istio_namespaces, vec!["istio-system".to_string()]);

        let names: Vec<String> = config
            .requested_namespaces()
            .into_iter()
            .map(|ns| ns.name)
            .collect();
        assert_eq!(names, vec!["bookinfo".to_string(), "shop".to_string()]);
        assert!(config.namespace_map()["istio-system"].is_istio);
    }

    #[test]
    fn test_load_requires_namespaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("grapher.toml");
        std::fs::write(&path, "api_port = 9000\n").unwrap();

        assert!(GrapherConfig::load_from(Some(&path)).is_err());
    }
}
