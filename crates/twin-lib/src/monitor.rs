//! Periodic per-node load sampling
//!
//! Every tick reads the latest emulated CPU utilization of each k3s node,
//! buckets it into a [`LoadCategory`] and hands the result to the topology
//! store for border coloring. A failed tick is skipped: the previous loads
//! stay in place and the next tick retries.

use crate::error::{TwinError, TwinResult};
use crate::health::{components, HealthRegistry};
use crate::metrics::{TimeseriesBackend, EMULATED_NODE_PREFIX, NODE_LABEL};
use crate::models::{LoadCategory, LoadMap, MetricType, NodeLoad};
use crate::observability::{StructuredLogger, TwinMetrics};
use crate::timers::{names, TimerSet};
use crate::topology::TopologyStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default sampling period
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(15);

pub struct LoadMonitor {
    topology: Arc<TopologyStore>,
    backend: Arc<dyn TimeseriesBackend>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: TwinMetrics,
    latest: RwLock<LoadMap>,
}

impl LoadMonitor {
    pub fn new(
        topology: Arc<TopologyStore>,
        backend: Arc<dyn TimeseriesBackend>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            topology,
            backend,
            health,
            logger,
            metrics: TwinMetrics::new(),
            latest: RwLock::new(LoadMap::new()),
        }
    }

    /// Current load category of every k3s node reporting utilization
    pub async fn sample(&self) -> TwinResult<LoadMap> {
        let k3s: HashSet<String> = self.topology.k3s_nodes().await?.into_iter().collect();
        let query = format!("{}_{}", EMULATED_NODE_PREFIX, MetricType::Cpu.series_suffix());
        let samples = self.backend.query_instant(&query).await?;

        let mut loads = LoadMap::new();
        for sample in samples {
            let Some(node) = sample.labels.get(NODE_LABEL) else {
                continue;
            };
            if !k3s.contains(node) || !sample.value.is_finite() {
                continue;
            }
            loads.insert(
                node.clone(),
                NodeLoad {
                    cpu_percent: sample.value,
                    category: LoadCategory::from_utilization(sample.value),
                },
            );
        }
        Ok(loads)
    }

    /// One sampling cycle. Never fails; errors degrade the monitor's health
    /// until the next successful cycle.
    pub async fn tick(&self) {
        let started = Instant::now();
        let result = self.sample().await;
        self.metrics
            .observe_load_sample_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(loads) => {
                let red = count(&loads, LoadCategory::Red);
                let amber = count(&loads, LoadCategory::Amber);
                self.logger.log_load_sampled(loads.len(), red, amber);

                self.topology.apply_load_colors(loads.clone()).await;
                self.latest.write().await.extend(loads);
                self.health.set_healthy(components::LOAD_MONITOR).await;
                self.health.set_healthy(components::METRICS_BACKEND).await;
            }
            Err(e) => {
                self.metrics.inc_load_sample_errors();
                warn!(error = %e, "Load sample failed, keeping previous loads");
                self.health
                    .set_degraded(components::LOAD_MONITOR, e.to_string())
                    .await;
                if matches!(e, TwinError::Fetch(_)) {
                    self.health
                        .set_degraded(components::METRICS_BACKEND, e.to_string())
                        .await;
                }
            }
        }
    }

    /// Run [`LoadMonitor::tick`] every `period` on its own timer
    pub fn start(self: &Arc<Self>, timers: &TimerSet, period: Duration) {
        let monitor = self.clone();
        timers.start(names::LOAD_SAMPLE, period, move || {
            let monitor = monitor.clone();
            async move { monitor.tick().await }
        });
        debug!(period_secs = period.as_secs(), "Load monitor scheduled");
    }

    /// Loads from the most recent successful cycles
    pub async fn latest(&self) -> LoadMap {
        self.latest.read().await.clone()
    }
}

fn count(loads: &LoadMap, category: LoadCategory) -> usize {
    loads.values().filter(|l| l.category == category).count()
}
