//! HTTP client for the Prometheus query API

use super::{MetricsQuerier, Sample, Vector};
use crate::error::GraphError;
use crate::observability::GraphMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

/// Configuration for the metrics backend client
#[derive(Debug, Clone, PartialEq)]
pub struct PromClientConfig {
    /// Base URL of the Prometheus server (e.g., "http://prometheus.istio-system:9090")
    pub url: String,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for PromClientConfig {
    fn default() -> Self {
        Self {
            url: "http://prometheus.istio-system:9090".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Metrics backend client
pub struct PromClient {
    client: Client,
    base_url: Url,
}

impl PromClient {
    /// Create a new client; fails if the URL is invalid or the HTTP client cannot be built
    pub fn new(config: &PromClientConfig) -> Result<Self, GraphError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                GraphError::metrics_client(format!("failed to create HTTP client: {}", e))
            })?;

        let mut base_url = Url::parse(&config.url)
            .map_err(|e| GraphError::metrics_client(format!("invalid URL {}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GraphError::metrics_client(format!(
                "invalid URL {}: not a base URL",
                config.url
            )));
        }
        // keep any path prefix when joining the API path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn decode(body: &str) -> Result<Vector, GraphError> {
        let response: ApiResponse = serde_json::from_str(body)?;

        if response.status != "success" {
            return Err(GraphError::backend(format!(
                "{}: {}",
                response.error_type.unwrap_or_else(|| response.status.clone()),
                response.error.unwrap_or_default()
            )));
        }

        let data = response
            .data
            .ok_or_else(|| GraphError::decode("response has no data"))?;
        if data.result_type != "vector" {
            return Err(GraphError::decode(format!(
                "expected vector result, got {}",
                data.result_type
            )));
        }

        let raw: Vec<RawSample> = serde_json::from_value(data.result)?;
        raw.into_iter()
            .map(|s| {
                let value = s.value.1.parse::<f64>().map_err(|e| {
                    GraphError::decode(format!("invalid sample value {:?}: {}", s.value.1, e))
                })?;
                Ok(Sample {
                    metric: s.metric,
                    value,
                    timestamp: s.value.0,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MetricsQuerier for PromClient {
    async fn query_vector(&self, query: &str, time: DateTime<Utc>) -> Result<Vector, GraphError> {
        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(|e| GraphError::metrics_client(format!("invalid query URL: {}", e)))?;
        let time_param = time.timestamp().to_string();

        trace!(query = %query, time = %time_param, "Querying metrics backend");
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .query(&[("query", query), ("time", time_param.as_str())])
            .send()
            .await
            .map_err(|source| GraphError::Query {
                query: query.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| GraphError::Query {
            query: query.to_string(),
            source,
        })?;
        GraphMetrics::new().observe_query_latency(start.elapsed().as_secs_f64());

        // error responses carry a JSON body with the reason; fall back to the HTTP status
        let vector = match Self::decode(&body) {
            Err(GraphError::Decode(_)) if !status.is_success() => {
                return Err(GraphError::backend(format!("HTTP {}: {}", status, body)));
            }
            other => other?,
        };

        debug!(samples = vector.len(), "Metrics backend query complete");
        Ok(vector)
    }
}

/// Builder for PromClient configuration
pub struct PromClientBuilder {
    config: PromClientConfig,
}

impl PromClientBuilder {
    pub fn new() -> Self {
        Self {
            config: PromClientConfig::default(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn config(&self) -> &PromClientConfig {
        &self.config
    }

    pub fn build(self) -> Result<PromClient, GraphError> {
        PromClient::new(&self.config)
    }
}

impl Default for PromClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    const VECTOR_BODY: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {
                    "metric": {
                        "source_workload": "productpage-v1",
                        "connection_security_policy": "mutual_tls"
                    },
                    "value": [1700000000, "8.5"]
                },
                {
                    "metric": {
                        "source_workload": "productpage-v1",
                        "connection_security_policy": "none"
                    },
                    "value": [1700000000, "1.5"]
                }
            ]
        }
    }"#;

    #[test]
    fn test_client_config_default() {
        let config = PromClientConfig::default();
        assert_eq!(config.url, "http://prometheus.istio-system:9090");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_pattern() {
        let client = PromClientBuilder::new()
            .url("http://localhost:9090/prometheus")
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(client.base_url().as_str(), "http://localhost:9090/prometheus/");
    }

    #[test]
    fn test_invalid_url_is_metrics_client_error() {
        let result = PromClientBuilder::new().url("not a url").build();
        assert!(matches!(result, Err(GraphError::MetricsClient(_))));
    }

    #[test]
    fn test_decode_vector() {
        let vector = PromClient::decode(VECTOR_BODY).unwrap();
        assert_eq!(vector.len(), 2);
        assert_eq!(vector[0].value, 8.5);
        assert_eq!(vector[0].timestamp, 1700000000.0);
        assert_eq!(vector[1].label("connection_security_policy"), Some("none"));
    }

    #[test]
    fn test_decode_rejects_matrix() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        assert!(matches!(PromClient::decode(body), Err(GraphError::Decode(_))));
    }

    #[test]
    fn test_decode_error_status() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#;
        match PromClient::decode(body) {
            Err(GraphError::Backend(msg)) => assert_eq!(msg, "bad_data: parse error"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_vector_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "up".into()),
                Matcher::UrlEncoded("time".into(), "1700000000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VECTOR_BODY)
            .create_async()
            .await;

        let client = PromClientBuilder::new().url(server.url()).build().unwrap();
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let vector = client.query_vector("up", time).await.unwrap();

        mock.assert_async().await;
        assert_eq!(vector.len(), 2);
    }

    #[tokio::test]
    async fn test_query_vector_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("service unavailable")
            .create_async()
            .await;

        let client = PromClientBuilder::new().url(server.url()).build().unwrap();
        let result = client.query_vector("up", Utc::now()).await;

        assert!(matches!(result, Err(GraphError::Backend(_))));
    }
}
