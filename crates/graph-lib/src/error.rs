//! Error types for graph enrichment

use thiserror::Error;

/// Main error type for graph building and enrichment
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The metrics backend client could not be constructed
    #[error("metrics client error: {0}")]
    MetricsClient(String),

    /// A query could not be delivered to the metrics backend
    #[error("query failed: {query}: {source}")]
    Query {
        query: String,
        #[source]
        source: reqwest::Error,
    },

    /// The metrics backend answered with an error status
    #[error("metrics backend error: {0}")]
    Backend(String),

    /// The metrics backend response could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// A traffic map snapshot could not be read or written
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// A pipeline task ended without reporting a result
    #[error("pipeline task error: {0}")]
    Task(String),
}

impl GraphError {
    /// Create a metrics client error with the given message
    pub fn metrics_client(msg: impl Into<String>) -> Self {
        Self::MetricsClient(msg.into())
    }

    /// Create a backend error with the given message
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a snapshot error with the given message
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Short label used for the pipeline run metric
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MetricsClient(_) => "metrics_client",
            Self::Query { .. } => "query",
            Self::Backend(_) => "backend",
            Self::Decode(_) => "decode",
            Self::Snapshot(_) => "snapshot",
            Self::Task(_) => "task",
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::metrics_client("invalid url");
        assert_eq!(err.to_string(), "metrics client error: invalid url");
        assert_eq!(err.kind(), "metrics_client");
    }

    #[test]
    fn test_json_error_converts_to_decode() {
        let err: GraphError = serde_json::from_str::<Vec<u8>>("not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "decode");
    }
}
