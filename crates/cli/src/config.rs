//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults read from `~/.config/meshgraph/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Metrics backend URL
    pub prometheus_url: Option<String>,
    pub query_timeout_secs: Option<u64>,
    /// Query window in seconds
    pub duration_secs: Option<u64>,
    /// Default graph type (app, versionedApp, workload, service)
    pub graph_type: Option<String>,
    /// Mesh control-plane namespaces
    pub istio_namespaces: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from the user config file, if present
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("meshgraph").join("config.json"))
    }
}
