//! Time-series retrieval for nodes and virtual pods
//!
//! This module provides:
//! - The backend abstraction over the time-series store
//! - A Prometheus HTTP implementation of that backend
//! - The windowed query gateway used for display and comparison
//! - Auto-refreshing chart views

mod backend;
mod cache;
mod refresh;
mod window;

pub use backend::{PrometheusBackend, DEFAULT_QUERY_TIMEOUT};
pub use cache::TtlCache;
pub use refresh::{ChartData, ChartRefresher, ChartRequest, ChartState};
pub use window::Window;

use crate::error::{TwinError, TwinResult};
use crate::models::{MetricSeries, MetricType, NodeTimeseries, SeriesOwner};
use crate::observability::TwinMetrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Series name prefix for telemetry replayed into the emulation
pub const EMULATED_NODE_PREFIX: &str = "emulation_node";
/// Series name prefix for the recorded real-world reference
pub const REAL_NODE_PREFIX: &str = "real_node";
/// Series name prefix for per-pod replayed telemetry
pub const EMULATED_POD_PREFIX: &str = "emulation_pod";
/// Label carrying the emulated node id
pub const NODE_LABEL: &str = "container_node";

/// A labelled range-query result
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub labels: HashMap<String, String>,
    pub points: Vec<(f64, f64)>,
}

/// A labelled instant-query result
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub labels: HashMap<String, String>,
    pub timestamp: f64,
    pub value: f64,
}

/// Trait for time-series storage backends
#[async_trait]
pub trait TimeseriesBackend: Send + Sync {
    /// Evaluate `query` over `[start, end]` at `step`. An empty result means
    /// the series does not exist.
    async fn query_range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        step: Duration,
    ) -> TwinResult<Vec<RawSeries>>;

    /// Evaluate `query` at the current instant
    async fn query_instant(&self, query: &str) -> TwinResult<Vec<RawSample>>;
}

/// Build a series selector, e.g. `name{a="x",b="y"}`
pub fn selector(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let matchers = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{{{}}}", name, matchers)
}

/// Windowed query gateway over a [`TimeseriesBackend`]
pub struct MetricsGateway {
    backend: Arc<dyn TimeseriesBackend>,
    cache: TtlCache<(String, Window), Vec<(f64, f64)>>,
    metrics: TwinMetrics,
}

impl MetricsGateway {
    pub fn new(backend: Arc<dyn TimeseriesBackend>) -> Self {
        Self {
            backend,
            cache: TtlCache::new(),
            metrics: TwinMetrics::new(),
        }
    }

    pub fn backend(&self) -> Arc<dyn TimeseriesBackend> {
        self.backend.clone()
    }

    /// Drop every cached series
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Emulated and real series for one node.
    ///
    /// Series missing from the backend are omitted. Fails with
    /// [`TwinError::NoData`] only when neither exists.
    pub async fn get_node_timeseries(
        &self,
        node_id: &str,
        metric: MetricType,
        window: Window,
    ) -> TwinResult<NodeTimeseries> {
        let owner = SeriesOwner::Node {
            node: node_id.to_string(),
        };
        let labels = [(NODE_LABEL, node_id)];

        let emulated = self
            .fetch_series(
                &selector(&series_name(EMULATED_NODE_PREFIX, metric), &labels),
                window,
            )
            .await;
        let real = self
            .fetch_series(&selector(&series_name(REAL_NODE_PREFIX, metric), &labels), window)
            .await;

        let (emulated, emulated_err) = split(emulated);
        let (real, real_err) = split(real);

        if emulated.is_none() && real.is_none() {
            if let Some(e) = emulated_err.or(real_err) {
                return Err(e);
            }
            return Err(TwinError::NoData(format!(
                "no {} series for node {} in the last {}",
                metric.series_suffix(),
                node_id,
                window
            )));
        }

        if let Some(e) = emulated_err.as_ref().or(real_err.as_ref()) {
            warn!(node = %node_id, error = %e, "Returning partial node series");
        }

        let to_series = |points: Vec<(f64, f64)>| {
            MetricSeries::from_points(owner.clone(), metric, window, points)
        };

        Ok(NodeTimeseries {
            node: node_id.to_string(),
            metric,
            emulated: emulated.map(&to_series),
            real: real.map(&to_series),
        })
    }

    /// Single replayed series for one pod on one node
    pub async fn get_pod_timeseries(
        &self,
        node_id: &str,
        namespace: &str,
        pod_name: &str,
        metric: MetricType,
        window: Window,
    ) -> TwinResult<MetricSeries> {
        let query = selector(
            &series_name(EMULATED_POD_PREFIX, metric),
            &[(NODE_LABEL, node_id), ("namespace", namespace), ("pod", pod_name)],
        );

        match self.fetch_series(&query, window).await? {
            Some(points) => Ok(MetricSeries::from_points(
                SeriesOwner::Pod {
                    node: node_id.to_string(),
                    namespace: namespace.to_string(),
                    pod: pod_name.to_string(),
                },
                metric,
                window,
                points,
            )),
            None => Err(TwinError::NoData(format!(
                "no {} series for pod {}/{} on {}",
                metric.series_suffix(),
                namespace,
                pod_name,
                node_id
            ))),
        }
    }

    /// Fetch the first non-empty series matching `query`, serving from cache
    /// only while the entry is younger than the window resolution.
    async fn fetch_series(
        &self,
        query: &str,
        window: Window,
    ) -> TwinResult<Option<Vec<(f64, f64)>>> {
        let key = (query.to_string(), window);
        if let Some(points) = self.cache.get(&key) {
            debug!(query = %query, window = %window, "Serving series from cache");
            return Ok(Some(points));
        }

        let (start, end) = window.range_ending_at(chrono::Utc::now().timestamp());
        let started = Instant::now();
        let result = self
            .backend
            .query_range(query, start, end, window.resolution())
            .await;
        self.metrics
            .observe_metrics_query_latency(started.elapsed().as_secs_f64());

        let points = result?
            .into_iter()
            .map(|s| s.points)
            .find(|points| !points.is_empty());

        if let Some(points) = &points {
            self.cache.insert(key, points.clone(), window.resolution());
        }
        Ok(points)
    }
}

fn series_name(prefix: &str, metric: MetricType) -> String {
    format!("{}_{}", prefix, metric.series_suffix())
}

fn split<T>(result: TwinResult<Option<T>>) -> (Option<T>, Option<TwinError>) {
    match result {
        Ok(v) => (v, None),
        Err(e) => (None, Some(e)),
    }
}
