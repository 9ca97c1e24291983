//! Test doubles for the collaborator traits

use crate::cluster::{ClusterOps, SyntheticPod};
use crate::connections::{ConnectionRegistry, ConnectionTable};
use crate::error::{TwinError, TwinResult};
use crate::metrics::{RawSample, RawSeries, TimeseriesBackend};
use crate::models::{
    ClusterInfo, ContainerInfo, ContainerState, ContainerStatus, EmulationResource, Link, Node, NodeType,
    ReplayHandle, Topology,
};
use crate::observability::StructuredLogger;
use crate::pods::{PodDeps, PodLifecycleManager, PodSettings, ReplayConfig, Replayer};
use crate::store::JsonFile;
use crate::topology::{StatusProbe, TopologySource, TopologyStore};
use crate::workload::WorkloadCatalog;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// r1 (router), sw1 (switch), serf1..serf4 (k3s)
pub fn sample_topology() -> Topology {
    let mut nodes = vec![
        Node::new("r1", NodeType::Router),
        Node::new("sw1", NodeType::Switch),
    ];
    for i in 1..=4 {
        let mut node = Node::new(format!("serf{}", i), NodeType::K3sNode);
        node.kind = "k8s-kind".to_string();
        nodes.push(node);
    }
    let link = |s: &str, t: &str| Link {
        source: s.to_string(),
        target: t.to_string(),
    };
    Topology {
        name: "emulation".to_string(),
        nodes,
        links: vec![
            link("r1", "sw1"),
            link("sw1", "serf1"),
            link("sw1", "serf2"),
            link("r1", "serf3"),
            link("r1", "serf4"),
        ],
    }
}

pub struct StaticTopologySource {
    topology: Topology,
    failing: AtomicBool,
}

impl StaticTopologySource {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TopologySource for StaticTopologySource {
    async fn fetch(&self) -> TwinResult<Topology> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TwinError::Fetch("topology file unavailable".to_string()));
        }
        Ok(self.topology.clone())
    }
}

#[derive(Default)]
pub struct StaticStatusProbe {
    statuses: Mutex<HashMap<String, ContainerStatus>>,
    failing: AtomicBool,
}

impl StaticStatusProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, node: &str, status: ContainerState, monitored: bool) {
        let mut urls = HashMap::new();
        if monitored {
            urls.insert(
                "grafana".to_string(),
                format!("http://grafana:3000/d/uid/emulation?var-Node={}", node),
            );
        }
        self.statuses
            .lock()
            .unwrap()
            .insert(node.to_string(), ContainerStatus { status, urls });
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusProbe for StaticStatusProbe {
    async fn probe(&self) -> TwinResult<HashMap<String, ContainerStatus>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TwinError::Fetch("docker daemon unreachable".to_string()));
        }
        Ok(self.statuses.lock().unwrap().clone())
    }

    async fn containers(&self) -> TwinResult<Vec<ContainerInfo>> {
        let statuses = self.probe().await?;
        Ok(statuses
            .into_iter()
            .map(|(node, status)| ContainerInfo {
                container_id: format!("{:0>12}", node),
                container_name: format!("clab-emulation-{}", node),
                node_name: node,
                state: status.status,
                status: String::new(),
                image: "rancher/k3s:v1.28".to_string(),
                labels: Default::default(),
                ports: Vec::new(),
            })
            .collect())
    }
}

/// Backend answering from canned series keyed by the exact query string
#[derive(Default)]
pub struct StaticBackend {
    ranges: Mutex<HashMap<String, Vec<(f64, f64)>>>,
    instants: Mutex<HashMap<String, Vec<RawSample>>>,
    failure: Mutex<Option<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_range(&self, query: &str, points: Vec<(f64, f64)>) {
        self.ranges.lock().unwrap().insert(query.to_string(), points);
    }

    pub fn set_instant(&self, query: &str, samples: Vec<RawSample>) {
        self.instants
            .lock()
            .unwrap()
            .insert(query.to_string(), samples);
    }

    /// Every subsequent query fails with a fetch error
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn range_calls(&self, query: &str) -> usize {
        self.calls.lock().unwrap().get(query).copied().unwrap_or(0)
    }

    fn check(&self) -> TwinResult<()> {
        match self.failure.lock().unwrap().as_ref() {
            Some(reason) => Err(TwinError::Fetch(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Instant sample of `emulation_node_cpu_percent` for `node`
pub fn cpu_sample(node: &str, value: f64) -> RawSample {
    let mut labels = HashMap::new();
    labels.insert(crate::metrics::NODE_LABEL.to_string(), node.to_string());
    RawSample {
        labels,
        timestamp: 1_700_000_000.0,
        value,
    }
}

#[async_trait]
impl TimeseriesBackend for StaticBackend {
    async fn query_range(
        &self,
        query: &str,
        _start: i64,
        _end: i64,
        _step: Duration,
    ) -> TwinResult<Vec<RawSeries>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default() += 1;
        self.check()?;
        Ok(self
            .ranges
            .lock()
            .unwrap()
            .get(query)
            .map(|points| {
                vec![RawSeries {
                    labels: HashMap::new(),
                    points: points.clone(),
                }]
            })
            .unwrap_or_default())
    }

    async fn query_instant(&self, query: &str) -> TwinResult<Vec<RawSample>> {
        self.check()?;
        Ok(self
            .instants
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory cluster recording applied and deleted pods
#[derive(Default)]
pub struct MockCluster {
    applied: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<(String, String)>>,
    fail_apply_on: Mutex<Option<String>>,
    fail_delete: AtomicBool,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placements on `node` fail as if its cluster were not ready
    pub fn fail_apply_on(&self, node: &str) {
        *self.fail_apply_on.lock().unwrap() = Some(node.to_string());
    }

    pub fn fail_deletes(&self, failing: bool) {
        self.fail_delete.store(failing, Ordering::SeqCst);
    }

    /// (node, pod name) pairs currently placed
    pub fn placed(&self) -> Vec<(String, String)> {
        let deleted = self.deleted.lock().unwrap().clone();
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !deleted.contains(p))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClusterOps for MockCluster {
    async fn ensure_namespace(&self, _node: &str, _namespace: &str) -> TwinResult<()> {
        Ok(())
    }

    async fn apply_pod(&self, node: &str, pod: &SyntheticPod) -> TwinResult<()> {
        if self.fail_apply_on.lock().unwrap().as_deref() == Some(node) {
            return Err(TwinError::Resource(format!("cluster on {} is not ready", node)));
        }
        self.applied
            .lock()
            .unwrap()
            .push((node.to_string(), pod.name.clone()));
        Ok(())
    }

    async fn delete_pod(&self, node: &str, _namespace: &str, name: &str) -> TwinResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(TwinError::Resource(format!("kubectl on {} timed out", node)));
        }
        self.deleted
            .lock()
            .unwrap()
            .push((node.to_string(), name.to_string()));
        Ok(())
    }

    async fn cluster_info(&self, node: &str) -> TwinResult<ClusterInfo> {
        Ok(ClusterInfo {
            node_name: node.to_string(),
            namespaces: vec!["default".to_string()],
            nodes: Vec::new(),
            pods_by_namespace: HashMap::new(),
            total_pods: 0,
        })
    }

    async fn emulation_config(&self, _node: &str) -> TwinResult<Vec<EmulationResource>> {
        Ok(Vec::new())
    }
}

/// Replayer keeping its "processes" in a set of pids
#[derive(Default)]
pub struct MockReplayer {
    next_pid: AtomicU32,
    running: Mutex<HashSet<String>>,
    stopped: Mutex<Vec<String>>,
    fail_start: AtomicBool,
    hang_on_stop: AtomicBool,
}

impl MockReplayer {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(4000),
            ..Default::default()
        }
    }

    pub fn fail_start(&self, failing: bool) {
        self.fail_start.store(failing, Ordering::SeqCst);
    }

    /// Stops time out as if the process ignored the signal
    pub fn hang_on_stop(&self, hanging: bool) {
        self.hang_on_stop.store(hanging, Ordering::SeqCst);
    }

    pub fn is_running(&self, pid: &str) -> bool {
        self.running.lock().unwrap().contains(pid)
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl Replayer for MockReplayer {
    async fn start(
        &self,
        node: &str,
        pod_id: &str,
        _config: &ReplayConfig,
        _interval: u64,
    ) -> TwinResult<ReplayHandle> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TwinError::Process(format!(
                "replayer for {} exited right after start",
                pod_id
            )));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst).to_string();
        self.running.lock().unwrap().insert(pid.clone());
        Ok(ReplayHandle {
            node: node.to_string(),
            pid,
            config_path: format!("/opt/annotations/virtual_pods/{}.json", pod_id),
        })
    }

    async fn stop(&self, handle: &ReplayHandle) -> TwinResult<()> {
        if self.hang_on_stop.load(Ordering::SeqCst) {
            return Err(TwinError::Process(format!(
                "replayer {} still running after 10s",
                handle.pid
            )));
        }
        self.running.lock().unwrap().remove(&handle.pid);
        self.stopped.lock().unwrap().push(handle.pid.clone());
        Ok(())
    }
}

pub const WORKLOAD: &str = "workloadA.json";

/// Fully wired core over test doubles in a temporary directory
pub struct TestStack {
    pub dir: tempfile::TempDir,
    pub topology: Arc<TopologyStore>,
    pub table: Arc<ConnectionTable>,
    pub pods: Arc<PodLifecycleManager>,
    pub connections: ConnectionRegistry,
    pub cluster: Arc<MockCluster>,
    pub replayer: Arc<MockReplayer>,
}

impl TestStack {
    pub async fn new(dwell: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::open(dir, dwell).await
    }

    /// Build a stack over an existing directory, restoring persisted state
    pub async fn open(dir: tempfile::TempDir, dwell: Duration) -> Self {
        let templates = dir.path().join("workload_templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(
            templates.join(WORKLOAD),
            r#"{"time_series":[{"cpu":120,"memory":256,"power":4.5,"psi":0.1},{"cpu":140,"memory":260}]}"#,
        )
        .unwrap();

        let topology = Arc::new(TopologyStore::new(Arc::new(StaticTopologySource::new(
            sample_topology(),
        ))));
        topology.load().await.unwrap();

        let table = Arc::new(
            ConnectionTable::open(JsonFile::new(dir.path().join("liqo_connections.json")))
                .await
                .unwrap(),
        );
        let cluster = Arc::new(MockCluster::new());
        let replayer = Arc::new(MockReplayer::new());
        let logger = StructuredLogger::new("test");

        let pods = Arc::new(
            PodLifecycleManager::open(
                PodDeps {
                    topology: topology.clone(),
                    connections: table.clone(),
                    catalog: Arc::new(WorkloadCatalog::new(templates)),
                    cluster: cluster.clone(),
                    replayer: replayer.clone(),
                },
                PodSettings::default(),
                JsonFile::new(dir.path().join("virtual_pods_registry.json")),
                logger.clone(),
            )
            .await
            .unwrap(),
        );
        let connections =
            ConnectionRegistry::new(topology.clone(), table.clone(), pods.clone(), dwell, logger);

        Self {
            dir,
            topology,
            table,
            pods,
            connections,
            cluster,
            replayer,
        }
    }
}
