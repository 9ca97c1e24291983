//! Prometheus HTTP API backend
//!
//! Speaks the `/api/v1/query` and `/api/v1/query_range` endpoints of the
//! central scrape server that aggregates emulated and real node telemetry.

use super::{RawSample, RawSeries, TimeseriesBackend};
use crate::error::{TwinError, TwinResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout for a single backend request
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    data: Option<PromData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromResult>,
}

#[derive(Debug, Deserialize)]
struct PromResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// Present on range queries
    #[serde(default)]
    values: Vec<(f64, String)>,
    /// Present on instant queries
    #[serde(default)]
    value: Option<(f64, String)>,
}

/// Client for a Prometheus-compatible query API
pub struct PrometheusBackend {
    client: Client,
    base_url: Url,
}

impl PrometheusBackend {
    pub fn new(base_url: &str) -> TwinResult<Self> {
        Self::with_timeout(base_url, DEFAULT_QUERY_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> TwinResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TwinError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| TwinError::Fetch(format!("invalid backend URL '{}': {}", base_url, e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> TwinResult<Vec<PromResult>> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TwinError::Fetch(format!("invalid path {}: {}", path, e)))?;

        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        let body: PromResponse = response.json().await.map_err(|e| {
            TwinError::Fetch(format!("unreadable backend response ({}): {}", status, e))
        })?;

        if body.status != "success" {
            return Err(TwinError::Fetch(
                body.error
                    .unwrap_or_else(|| format!("backend returned status {}", body.status)),
            ));
        }

        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }
}

/// Parse a sample value, dropping points that are not numeric
fn parse_point((ts, raw): (f64, String)) -> Option<(f64, f64)> {
    raw.parse::<f64>().ok().map(|v| (ts, v))
}

#[async_trait]
impl TimeseriesBackend for PrometheusBackend {
    async fn query_range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        step: Duration,
    ) -> TwinResult<Vec<RawSeries>> {
        debug!(query = %query, start, end, step_secs = step.as_secs(), "Range query");

        let results = self
            .get(
                "api/v1/query_range",
                &[
                    ("query", query.to_string()),
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                    ("step", format!("{}s", step.as_secs())),
                ],
            )
            .await?;

        Ok(results
            .into_iter()
            .map(|r| RawSeries {
                labels: r.metric,
                points: r.values.into_iter().filter_map(parse_point).collect(),
            })
            .collect())
    }

    async fn query_instant(&self, query: &str) -> TwinResult<Vec<RawSample>> {
        debug!(query = %query, "Instant query");

        let results = self
            .get("api/v1/query", &[("query", query.to_string())])
            .await?;

        Ok(results
            .into_iter()
            .filter_map(|r| {
                let (timestamp, value) = r.value.and_then(parse_point)?;
                Some(RawSample {
                    labels: r.metric,
                    timestamp,
                    value,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_range_parses_matrix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(mockito::Matcher::UrlEncoded(
                "query".into(),
                r#"emulation_node_cpu_percent{container_node="serf1"}"#.into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","data":{"resultType":"matrix","result":[
                    {"metric":{"container_node":"serf1"},
                     "values":[[1700000000,"12.5"],[1700000015,"NaN-ish"],[1700000030,"14"]]}
                ]}}"#,
            )
            .create_async()
            .await;

        let backend = PrometheusBackend::new(&server.url()).unwrap();
        let series = backend
            .query_range(
                r#"emulation_node_cpu_percent{container_node="serf1"}"#,
                1_699_999_700,
                1_700_000_000,
                Duration::from_secs(15),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].points, vec![(1_700_000_000.0, 12.5), (1_700_000_030.0, 14.0)]);
        assert_eq!(series[0].labels["container_node"], "serf1");
    }

    #[tokio::test]
    async fn test_query_instant_parses_vector() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"status":"success","data":{"resultType":"vector","result":[
                    {"metric":{"container_node":"serf1"},"value":[1700000000,"65"]},
                    {"metric":{"container_node":"serf2"},"value":[1700000000,"85.5"]}
                ]}}"#,
            )
            .create_async()
            .await;

        let backend = PrometheusBackend::new(&server.url()).unwrap();
        let samples = backend.query_instant("emulation_node_cpu_percent").await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 85.5);
    }

    #[tokio::test]
    async fn test_backend_error_status_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .create_async()
            .await;

        let backend = PrometheusBackend::new(&server.url()).unwrap();
        let err = backend.query_instant("bad{").await.unwrap_err();

        assert!(matches!(err, TwinError::Fetch(ref msg) if msg == "parse error"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_fetch_error() {
        let backend = PrometheusBackend::with_timeout("http://127.0.0.1:1", Duration::from_millis(200))
            .unwrap();
        let err = backend.query_instant("up").await.unwrap_err();

        assert!(matches!(err, TwinError::Fetch(_)));
    }
}
