//! CLI commands

pub mod annotate;
pub mod queries;
pub mod show;

use crate::config::Config;
use anyhow::{Context, Result};
use graph_lib::graph::{namespace_info_map, GraphType, NamespaceInfo, DEFAULT_DURATION};
use graph_lib::telemetry::PromClientConfig;
use graph_lib::SecurityPolicyAppender;
use std::collections::BTreeSet;
use std::time::Duration;

/// Values given on the command line
#[derive(Debug, Default)]
pub struct SettingsArgs {
    pub prometheus_url: Option<String>,
    pub query_timeout_secs: Option<u64>,
    pub namespaces: Vec<String>,
    pub duration_secs: Option<u64>,
    pub graph_type: Option<GraphType>,
    pub inject_service_nodes: bool,
    pub istio_namespaces: Vec<String>,
}

/// Command line values merged over the config file and built-in defaults
#[derive(Debug, Clone)]
pub struct Settings {
    pub prom_config: PromClientConfig,
    pub namespaces: Vec<String>,
    pub duration: Duration,
    pub graph_type: GraphType,
    pub inject_service_nodes: bool,
    pub istio_namespaces: Vec<String>,
}

impl Settings {
    pub fn resolve(defaults: &Config, args: SettingsArgs) -> Result<Self> {
        let mut prom_config = PromClientConfig::default();
        if let Some(url) = args.prometheus_url.or_else(|| defaults.prometheus_url.clone()) {
            prom_config.url = url;
        }
        if let Some(secs) = args.query_timeout_secs.or(defaults.query_timeout_secs) {
            prom_config.request_timeout = Duration::from_secs(secs);
        }

        let graph_type = match (args.graph_type, defaults.graph_type.as_deref()) {
            (Some(graph_type), _) => graph_type,
            (None, Some(name)) => name
                .parse::<GraphType>()
                .map_err(anyhow::Error::msg)
                .context("Invalid graph_type in config file")?,
            (None, None) => GraphType::default(),
        };

        let duration = args
            .duration_secs
            .or(defaults.duration_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DURATION);

        let istio_namespaces = if !args.istio_namespaces.is_empty() {
            args.istio_namespaces
        } else {
            defaults
                .istio_namespaces
                .clone()
                .unwrap_or_else(|| vec!["istio-system".to_string()])
        };

        let mut namespaces = args.namespaces;
        namespaces.retain(|ns| !ns.is_empty());
        namespaces.sort();
        namespaces.dedup();
        if namespaces.is_empty() {
            anyhow::bail!("at least one namespace is required");
        }

        Ok(Self {
            prom_config,
            namespaces,
            duration,
            graph_type,
            inject_service_nodes: args.inject_service_nodes,
            istio_namespaces,
        })
    }

    pub fn requested(&self) -> BTreeSet<String> {
        self.namespaces.iter().cloned().collect()
    }

    /// Requested namespaces in pipeline order
    pub fn namespace_infos(&self) -> Vec<NamespaceInfo> {
        let map = namespace_info_map(&self.namespaces, &self.istio_namespaces, self.duration);
        self.namespaces
            .iter()
            .filter_map(|name| map.get(name).cloned())
            .collect()
    }

    pub fn security_policy_appender(&self) -> SecurityPolicyAppender {
        SecurityPolicyAppender::new(
            self.graph_type,
            self.inject_service_nodes,
            namespace_info_map(&self.namespaces, &self.istio_namespaces, self.duration),
            &self.requested(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(namespaces: &[&str]) -> SettingsArgs {
        SettingsArgs {
            namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
            inject_service_nodes: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&Config::default(), args(&["bookinfo"])).unwrap();

        assert_eq!(settings.prom_config, PromClientConfig::default());
        assert_eq!(settings.duration, DEFAULT_DURATION);
        assert_eq!(settings.graph_type, GraphType::Workload);
        assert_eq!(settings.istio_namespaces, vec!["istio-system".to_string()]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let defaults = Config {
            prometheus_url: Some("http://from-file:9090".to_string()),
            duration_secs: Some(120),
            graph_type: Some("app".to_string()),
            ..Default::default()
        };
        let mut cli = args(&["bookinfo"]);
        cli.prometheus_url = Some("http://from-flag:9090".to_string());

        let settings = Settings::resolve(&defaults, cli).unwrap();

        assert_eq!(settings.prom_config.url, "http://from-flag:9090");
        assert_eq!(settings.duration, Duration::from_secs(120));
        assert_eq!(settings.graph_type, GraphType::App);
    }

    #[test]
    fn test_invalid_graph_type_in_config_file() {
        let defaults = Config {
            graph_type: Some("cluster".to_string()),
            ..Default::default()
        };
        assert!(Settings::resolve(&defaults, args(&["bookinfo"])).is_err());
    }

    #[test]
    fn test_namespaces_deduplicated() {
        let settings =
            Settings::resolve(&Config::default(), args(&["shop", "bookinfo", "shop", ""])).unwrap();
        assert_eq!(settings.namespaces, vec!["bookinfo".to_string(), "shop".to_string()]);
        assert!(Settings::resolve(&Config::default(), args(&[])).is_err());
    }

    #[test]
    fn test_requested_istio_namespace_not_excluded() {
        let settings =
            Settings::resolve(&Config::default(), args(&["bookinfo", "istio-system"])).unwrap();
        let appender = settings.security_policy_appender();
        assert!(appender.excluded_namespaces().is_empty());
        assert_eq!(settings.namespace_infos().len(), 2);
    }
}
