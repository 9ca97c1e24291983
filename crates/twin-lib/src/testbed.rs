//! Wiring of the orchestration core
//!
//! [`TestbedBuilder`] assembles the stores and managers over injected
//! collaborators; [`Testbed`] owns them together with the background timers.

use crate::cluster::ClusterOps;
use crate::connections::{ConnectionRegistry, ConnectionTable, DEFAULT_CONFIRM_DWELL};
use crate::error::TwinResult;
use crate::health::{components, HealthRegistry};
use crate::host::{HostStats, SystemStatus};
use crate::metrics::{ChartRefresher, MetricsGateway, TimeseriesBackend};
use crate::models::{ClusterInfo, ContainerInfo, EmulationResource};
use crate::monitor::LoadMonitor;
use crate::observability::StructuredLogger;
use crate::pods::{PodDeps, PodLifecycleManager, PodSettings, Replayer};
use crate::store::JsonFile;
use crate::timers::{names, TimerSet};
use crate::topology::{StatusProbe, TopologySource, TopologyStore};
use crate::workload::WorkloadCatalog;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fully wired testbed core
pub struct Testbed {
    topology: Arc<TopologyStore>,
    connections: ConnectionRegistry,
    pods: Arc<PodLifecycleManager>,
    catalog: Arc<WorkloadCatalog>,
    cluster: Arc<dyn ClusterOps>,
    gateway: Arc<MetricsGateway>,
    charts: ChartRefresher,
    monitor: Arc<LoadMonitor>,
    health: HealthRegistry,
    host: HostStats,
    timers: Arc<TimerSet>,
    logger: StructuredLogger,
}

impl Testbed {
    pub fn builder() -> TestbedBuilder {
        TestbedBuilder::new()
    }

    /// Load the topology and mark the testbed ready.
    ///
    /// A topology that cannot be loaded leaves the testbed not ready; the
    /// status poll keeps retrying.
    pub async fn initialize(&self) -> TwinResult<()> {
        match self.topology.load().await {
            Ok(topology) => {
                let k3s = topology.nodes.iter().filter(|n| n.is_k3s()).count();
                self.health.set_healthy(components::TOPOLOGY).await;
                self.health.set_ready(true).await;
                self.logger
                    .log_startup(env!("CARGO_PKG_VERSION"), topology.nodes.len(), k3s);
                Ok(())
            }
            Err(e) => {
                self.health
                    .set_unhealthy(components::TOPOLOGY, e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    /// Start load sampling and container status polling
    pub fn start_background(&self, load_period: Duration, status_period: Duration) {
        self.monitor.start(&self.timers, load_period);

        let topology = self.topology.clone();
        let health = self.health.clone();
        self.timers.start(names::STATUS_POLL, status_period, move || {
            let topology = topology.clone();
            let health = health.clone();
            async move { poll_status(&topology, &health).await }
        });
        info!(
            load_period_secs = load_period.as_secs(),
            status_period_secs = status_period.as_secs(),
            "Background timers started"
        );
    }

    pub fn shutdown(&self, reason: &str) {
        self.timers.cancel_all();
        self.logger.log_shutdown(reason);
    }

    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn pods(&self) -> &Arc<PodLifecycleManager> {
        &self.pods
    }

    pub fn catalog(&self) -> &Arc<WorkloadCatalog> {
        &self.catalog
    }

    pub fn metrics(&self) -> &Arc<MetricsGateway> {
        &self.gateway
    }

    pub fn charts(&self) -> &ChartRefresher {
        &self.charts
    }

    pub fn monitor(&self) -> &Arc<LoadMonitor> {
        &self.monitor
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn timers(&self) -> &Arc<TimerSet> {
        &self.timers
    }

    /// Cluster detail as seen from a k3s node's own API server
    pub async fn cluster_info(&self, node: &str) -> TwinResult<ClusterInfo> {
        self.topology.require_k3s(node).await?;
        self.cluster.cluster_info(node).await
    }

    /// Node containers with their published ports
    pub async fn containers(&self) -> TwinResult<Vec<ContainerInfo>> {
        self.topology.containers().await
    }

    /// CPU, memory and root disk usage of the orchestrator host
    pub async fn system_status(&self) -> SystemStatus {
        self.host.sample().await
    }

    /// Emulated resources configured on a k3s node
    pub async fn emulation_config(&self, node: &str) -> TwinResult<Vec<EmulationResource>> {
        self.topology.require_k3s(node).await?;
        self.cluster.emulation_config(node).await
    }
}

async fn poll_status(topology: &TopologyStore, health: &HealthRegistry) {
    // Without a snapshot yet, retry the full load
    let result = match topology.snapshot().await {
        Ok(_) => topology.refresh_status().await,
        Err(_) => topology.load().await.map(|_| ()),
    };
    match result {
        Ok(()) => {
            health.set_healthy(components::TOPOLOGY).await;
            health.set_ready(true).await;
        }
        Err(e) => {
            warn!(error = %e, "Status poll failed");
            health
                .set_degraded(components::TOPOLOGY, e.to_string())
                .await;
        }
    }
}

/// Builder for [`Testbed`]
pub struct TestbedBuilder {
    name: String,
    topology_source: Option<Arc<dyn TopologySource>>,
    status_probe: Option<Arc<dyn StatusProbe>>,
    backend: Option<Arc<dyn TimeseriesBackend>>,
    cluster: Option<Arc<dyn ClusterOps>>,
    replayer: Option<Arc<dyn Replayer>>,
    templates_dir: PathBuf,
    connections_file: PathBuf,
    registry_file: PathBuf,
    pod_settings: PodSettings,
    confirm_dwell: Duration,
}

impl TestbedBuilder {
    pub fn new() -> Self {
        Self {
            name: "emulation".to_string(),
            topology_source: None,
            status_probe: None,
            backend: None,
            cluster: None,
            replayer: None,
            templates_dir: PathBuf::from("workload_templates"),
            connections_file: PathBuf::from("liqo_connections.json"),
            registry_file: PathBuf::from("virtual_pods_registry.json"),
            pod_settings: PodSettings::default(),
            confirm_dwell: DEFAULT_CONFIRM_DWELL,
        }
    }

    /// Name used in lifecycle logs
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn topology_source(mut self, source: Arc<dyn TopologySource>) -> Self {
        self.topology_source = Some(source);
        self
    }

    pub fn status_probe(mut self, probe: Arc<dyn StatusProbe>) -> Self {
        self.status_probe = Some(probe);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn TimeseriesBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterOps>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn replayer(mut self, replayer: Arc<dyn Replayer>) -> Self {
        self.replayer = Some(replayer);
        self
    }

    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    pub fn connections_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.connections_file = path.into();
        self
    }

    pub fn registry_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_file = path.into();
        self
    }

    pub fn pod_settings(mut self, settings: PodSettings) -> Self {
        self.pod_settings = settings;
        self
    }

    pub fn confirm_dwell(mut self, dwell: Duration) -> Self {
        self.confirm_dwell = dwell;
        self
    }

    /// Open persisted state and wire every component
    pub async fn build(self) -> Result<Testbed> {
        let source = self
            .topology_source
            .ok_or_else(|| anyhow::anyhow!("Topology source is required"))?;
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("Timeseries backend is required"))?;
        let cluster = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("Cluster driver is required"))?;
        let replayer = self
            .replayer
            .ok_or_else(|| anyhow::anyhow!("Replayer is required"))?;

        let logger = StructuredLogger::new(&self.name);
        let health = HealthRegistry::new();
        health.register(components::ALL).await;

        let mut topology = TopologyStore::new(source);
        if let Some(probe) = self.status_probe {
            topology = topology.with_probe(probe);
        }
        let topology = Arc::new(topology);

        let table = Arc::new(
            ConnectionTable::open(JsonFile::new(&self.connections_file))
                .await
                .with_context(|| {
                    format!("Failed to open {}", self.connections_file.display())
                })?,
        );
        let catalog = Arc::new(WorkloadCatalog::new(self.templates_dir));

        let pods = Arc::new(
            PodLifecycleManager::open(
                PodDeps {
                    topology: topology.clone(),
                    connections: table.clone(),
                    catalog: catalog.clone(),
                    cluster: cluster.clone(),
                    replayer,
                },
                self.pod_settings,
                JsonFile::new(&self.registry_file),
                logger.clone(),
            )
            .await
            .with_context(|| format!("Failed to open {}", self.registry_file.display()))?,
        );

        let connections = ConnectionRegistry::new(
            topology.clone(),
            table,
            pods.clone(),
            self.confirm_dwell,
            logger.clone(),
        );

        let timers = Arc::new(TimerSet::new());
        let gateway = Arc::new(MetricsGateway::new(backend.clone()));
        let charts = ChartRefresher::new(gateway.clone(), timers.clone());
        let monitor = Arc::new(LoadMonitor::new(
            topology.clone(),
            backend,
            health.clone(),
            logger.clone(),
        ));

        Ok(Testbed {
            topology,
            connections,
            pods,
            catalog,
            cluster,
            gateway,
            charts,
            monitor,
            health,
            host: HostStats::new(),
            timers,
            logger,
        })
    }
}

impl Default for TestbedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::testing::{
        cpu_sample, sample_topology, MockCluster, MockReplayer, StaticBackend,
        StaticTopologySource,
    };

    fn builder(dir: &std::path::Path) -> TestbedBuilder {
        Testbed::builder()
            .topology_source(Arc::new(StaticTopologySource::new(sample_topology())))
            .backend(Arc::new(StaticBackend::new()))
            .cluster(Arc::new(MockCluster::new()))
            .replayer(Arc::new(MockReplayer::new()))
            .templates_dir(dir.join("templates"))
            .connections_file(dir.join("liqo_connections.json"))
            .registry_file(dir.join("virtual_pods_registry.json"))
    }

    #[tokio::test]
    async fn test_build_requires_collaborators() {
        let result = Testbed::builder()
            .backend(Arc::new(StaticBackend::new()))
            .build()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_initialize_marks_ready() {
        let dir = tempfile::tempdir().unwrap();
        let testbed = builder(dir.path()).build().await.unwrap();
        assert!(!testbed.health().readiness().await.ready);

        testbed.initialize().await.unwrap();

        assert!(testbed.health().readiness().await.ready);
        assert_eq!(testbed.topology().k3s_nodes().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_topology_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticTopologySource::new(sample_topology());
        source.fail();
        let testbed = builder(dir.path())
            .topology_source(Arc::new(source))
            .build()
            .await
            .unwrap();

        assert!(testbed.initialize().await.is_err());
        let health = testbed.health().health().await;
        assert_eq!(
            health.components[components::TOPOLOGY].status,
            ComponentStatus::Unhealthy
        );
        assert!(!testbed.health().readiness().await.ready);
    }

    #[tokio::test]
    async fn test_cluster_detail_requires_k3s_node() {
        let dir = tempfile::tempdir().unwrap();
        let testbed = builder(dir.path()).build().await.unwrap();
        testbed.initialize().await.unwrap();

        assert_eq!(testbed.cluster_info("serf1").await.unwrap().node_name, "serf1");
        assert!(testbed.cluster_info("r1").await.is_err());
        assert!(testbed.emulation_config("serf2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_background_timers_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(StaticBackend::new());
        backend.set_instant(
            "emulation_node_cpu_percent",
            vec![cpu_sample("serf1", 90.0)],
        );
        let testbed = builder(dir.path())
            .backend(backend)
            .build()
            .await
            .unwrap();
        testbed.initialize().await.unwrap();

        testbed.start_background(Duration::from_millis(20), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            testbed.timers().active(),
            vec![names::LOAD_SAMPLE.to_string(), names::STATUS_POLL.to_string()]
        );
        assert!(testbed.topology().loads().await.contains_key("serf1"));

        testbed.shutdown("test");
        assert!(testbed.timers().active().is_empty());
    }
}
