//! Metrics backend access
//!
//! This module provides the query interface used by appenders and an HTTP
//! implementation speaking the Prometheus query API.

mod client;

pub use client::{PromClient, PromClientBuilder, PromClientConfig};

use crate::error::GraphError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One labeled instantaneous sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: f64,
}

impl Sample {
    pub fn new<K, V>(labels: impl IntoIterator<Item = (K, V)>, value: f64) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metric: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
            timestamp: 0.0,
        }
    }

    /// Value of a label, if reported
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self
            .metric
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{}}} => {}", labels, self.value)
    }
}

/// Result of an instant query
pub type Vector = Vec<Sample>;

/// Query interface to the metrics backend
#[async_trait]
pub trait MetricsQuerier: Send + Sync {
    /// Evaluate an instant query at `time`
    async fn query_vector(&self, query: &str, time: DateTime<Utc>) -> Result<Vector, GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_display() {
        let sample = Sample::new(
            [("source_workload", "productpage-v1"), ("reporter", "destination")],
            2.5,
        );
        assert_eq!(
            sample.to_string(),
            r#"{reporter="destination", source_workload="productpage-v1"} => 2.5"#
        );
        assert_eq!(sample.label("reporter"), Some("destination"));
        assert_eq!(sample.label("missing"), None);
    }
}
