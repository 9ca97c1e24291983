//! Core data models for the testbed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Role of a node in the emulated topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Router,
    Switch,
    #[serde(rename = "k3s-node")]
    K3sNode,
    #[serde(other)]
    Generic,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Router => "router",
            NodeType::Switch => "switch",
            NodeType::K3sNode => "k3s-node",
            NodeType::Generic => "generic",
        }
    }
}

/// Container runtime state of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Runtime status re-applied on every topology poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub status: ContainerState,
    /// Monitoring endpoint name -> URL
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        self.status == ContainerState::Running
    }

    pub fn has_monitoring(&self) -> bool {
        !self.urls.is_empty()
    }
}

/// A published container port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// `prometheus`, `grafana` or `port_<container port>`
    pub service: String,
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: String,
}

impl PortMapping {
    /// Human-readable `container -> host` form
    pub fn mapping(&self) -> String {
        format!("{} -> {}", self.container_port, self.host_port)
    }
}

/// A containerlab container as reported by the container runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Short (12 character) container id
    pub container_id: String,
    pub container_name: String,
    pub node_name: String,
    pub state: ContainerState,
    /// Runtime status line, e.g. `Up 3 hours`
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub kind: String,
    #[serde(default)]
    pub container: ContainerStatus,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            node_type,
            kind: "linux".to_string(),
            container: ContainerStatus::default(),
        }
    }

    pub fn is_k3s(&self) -> bool {
        self.node_type == NodeType::K3sNode
    }
}

/// Static link between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
}

/// Graph snapshot produced by the topology provisioner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Topology {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Unordered pair of node ids, stored in canonical (sorted) order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePair(String, String);

impl NodePair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }

    pub fn contains(&self, node: &str) -> bool {
        self.0 == node || self.1 == node
    }

    /// True when either endpoint is shared with `other`
    pub fn touches(&self, other: &NodePair) -> bool {
        self.contains(&other.0) || self.contains(&other.1)
    }

    /// The endpoint opposite to `node`, if `node` is part of the pair
    pub fn peer_of(&self, node: &str) -> Option<&str> {
        if self.0 == node {
            Some(&self.1)
        } else if self.1 == node {
            Some(&self.0)
        } else {
            None
        }
    }
}

impl std::fmt::Display for NodePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<->{}", self.0, self.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    Confirmed,
}

/// Peering connection between two k3s nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn pair(&self) -> NodePair {
        NodePair::new(&self.from, &self.to)
    }
}

/// Request body for connection upsert/removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodStatus {
    Creating,
    Running,
    Deleted,
}

/// Handle to a background replay process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayHandle {
    /// Node whose container hosts the process
    pub node: String,
    pub pid: String,
    /// Replay configuration file inside the container
    pub config_path: String,
}

/// Simulated offloaded workload bound to a peering connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualPod {
    pub id: String,
    pub source_node: String,
    pub dest_node: String,
    pub namespace: String,
    pub source_pod_name: String,
    pub dest_pod_name: String,
    pub kwok_node: String,
    pub workload_file: String,
    pub interval: u64,
    pub status: PodStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replayer: Option<ReplayHandle>,
}

impl VirtualPod {
    pub fn pair(&self) -> NodePair {
        NodePair::new(&self.source_node, &self.dest_node)
    }
}

/// Request body for virtual pod creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePodRequest {
    pub source_node: String,
    pub dest_node: String,
    pub workload_file: String,
    #[serde(default = "default_replay_interval")]
    pub interval: u64,
}

pub fn default_replay_interval() -> u64 {
    5
}

/// Catalog entry for a recorded workload profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadTemplate {
    pub filename: String,
    pub name: String,
    pub time_points: usize,
}

/// One recorded sample of a workload profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadPoint {
    /// CPU in millicores
    pub cpu: f64,
    /// Memory in MiB
    pub memory: f64,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub psi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadProfile {
    #[serde(default)]
    pub time_series: Vec<WorkloadPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Cpu,
    Memory,
    Psi,
    Power,
}

impl MetricType {
    /// Suffix of the exported series name for this metric
    pub fn series_suffix(&self) -> &'static str {
        match self {
            MetricType::Cpu => "cpu_percent",
            MetricType::Memory => "memory_percent",
            MetricType::Psi => "psi_percent",
            MetricType::Power => "power_watts",
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricType::Cpu),
            "memory" => Ok(MetricType::Memory),
            "psi" => Ok(MetricType::Psi),
            "power" => Ok(MetricType::Power),
            other => Err(format!("unknown metric type: {}", other)),
        }
    }
}

/// Owner of a metric series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum SeriesOwner {
    Node {
        node: String,
    },
    Pod {
        node: String,
        namespace: String,
        pod: String,
    },
}

/// Ordered time series; `timestamps` and `values` always have equal length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub owner: SeriesOwner,
    pub metric: MetricType,
    pub window: crate::metrics::Window,
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

impl MetricSeries {
    pub fn from_points(
        owner: SeriesOwner,
        metric: MetricType,
        window: crate::metrics::Window,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Self {
        let (timestamps, values) = points.into_iter().unzip();
        Self {
            owner,
            metric,
            window,
            timestamps,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Emulated and real series for one node; absent series are `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTimeseries {
    pub node: String,
    pub metric: MetricType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulated: Option<MetricSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real: Option<MetricSeries>,
}

/// Load bucket derived from instantaneous utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadCategory {
    Green,
    Amber,
    Red,
}

impl LoadCategory {
    /// Below 60% green, 60 to below 80% amber, 80% and above red
    pub fn from_utilization(percent: f64) -> Self {
        if percent >= 80.0 {
            LoadCategory::Red
        } else if percent >= 60.0 {
            LoadCategory::Amber
        } else {
            LoadCategory::Green
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadCategory::Green => "green",
            LoadCategory::Amber => "amber",
            LoadCategory::Red => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeLoad {
    pub cpu_percent: f64,
    pub category: LoadCategory,
}

pub type LoadMap = HashMap<String, NodeLoad>;

/// Node of an emulated cluster, as seen by its own API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeInfo {
    pub name: String,
    pub status: String,
    /// "kwok" for synthetic nodes, "real" otherwise
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPodInfo {
    pub name: String,
    pub status: String,
    pub node: String,
}

/// Cluster detail for a single k3s node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub node_name: String,
    pub namespaces: Vec<String>,
    pub nodes: Vec<ClusterNodeInfo>,
    pub pods_by_namespace: HashMap<String, Vec<ClusterPodInfo>>,
    pub total_pods: usize,
}

/// Emulated resources assigned to a synthetic node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulationResource {
    pub name: Option<String>,
    pub cpu: Option<serde_json::Value>,
    pub memory: Option<serde_json::Value>,
}
