//! Topology graph and per-node runtime status
//!
//! This module provides:
//! - The snapshot and status-probe abstractions
//! - A containerlab file source and a docker status probe
//! - Deterministic layout and status/load coloring
//! - The store that holds the current graph for everything else

mod color;
mod layout;
mod source;
mod status;

pub use color::{color_for, load_border, with_load, NodeColor};
pub use layout::{compute_layout, NodePosition};
pub use source::{classify, ClabTopologySource};
pub use status::{parse_containers, parse_docker_ps, DockerStatusProbe, MonitoringLinks};

use crate::error::{TwinError, TwinResult};
use crate::models::{ContainerInfo, ContainerStatus, Link, LoadMap, Node, NodeLoad, NodeType, Topology};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Provider of the node/link graph
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn fetch(&self) -> TwinResult<Topology>;
}

/// Provider of per-node container status, keyed by node id
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self) -> TwinResult<HashMap<String, ContainerStatus>>;

    /// Every node container with its published ports
    async fn containers(&self) -> TwinResult<Vec<ContainerInfo>>;
}

/// Node as rendered: position, colors and latest load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub x: f64,
    pub y: f64,
    pub color: NodeColor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<NodeLoad>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyView {
    pub name: String,
    pub nodes: Vec<NodeView>,
    pub links: Vec<Link>,
}

/// Holds the current topology snapshot and the latest load map
pub struct TopologyStore {
    source: Arc<dyn TopologySource>,
    probe: Option<Arc<dyn StatusProbe>>,
    snapshot: RwLock<Option<Topology>>,
    loads: RwLock<LoadMap>,
}

impl TopologyStore {
    pub fn new(source: Arc<dyn TopologySource>) -> Self {
        Self {
            source,
            probe: None,
            snapshot: RwLock::new(None),
            loads: RwLock::new(LoadMap::new()),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn StatusProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Fetch the graph, apply container statuses and replace the snapshot.
    ///
    /// Transport failures surface as [`TwinError::Fetch`] and keep the
    /// previous snapshot; a failed status probe only leaves statuses unknown.
    pub async fn load(&self) -> TwinResult<Topology> {
        let mut topology = self.source.fetch().await?;

        if let Some(probe) = &self.probe {
            match probe.probe().await {
                Ok(mut statuses) => {
                    for node in &mut topology.nodes {
                        node.container = statuses.remove(&node.id).unwrap_or_default();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Container status probe failed, statuses unknown");
                }
            }
        }

        debug!(
            topology = %topology.name,
            nodes = topology.nodes.len(),
            links = topology.links.len(),
            "Loaded topology"
        );
        *self.snapshot.write().await = Some(topology.clone());
        Ok(topology)
    }

    /// Re-apply container statuses to the current snapshot without
    /// re-reading the graph. A failed probe marks every status unknown.
    pub async fn refresh_status(&self) -> TwinResult<()> {
        let Some(probe) = &self.probe else {
            return Ok(());
        };
        let probed = probe.probe().await;

        let mut guard = self.snapshot.write().await;
        let Some(topology) = guard.as_mut() else {
            return probed.map(|_| ());
        };
        match probed {
            Ok(mut statuses) => {
                for node in &mut topology.nodes {
                    node.container = statuses.remove(&node.id).unwrap_or_default();
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Container status probe failed, statuses unknown");
                for node in &mut topology.nodes {
                    node.container = ContainerStatus::default();
                }
                Err(e)
            }
        }
    }

    /// Node containers sorted by node name; empty without a probe
    pub async fn containers(&self) -> TwinResult<Vec<ContainerInfo>> {
        let Some(probe) = &self.probe else {
            return Ok(Vec::new());
        };
        let mut containers = probe.containers().await?;
        containers.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        Ok(containers)
    }

    /// Current snapshot, loading it on first use
    pub async fn snapshot(&self) -> TwinResult<Topology> {
        if let Some(topology) = self.snapshot.read().await.as_ref() {
            return Ok(topology.clone());
        }
        self.load().await
    }

    pub async fn node(&self, id: &str) -> TwinResult<Node> {
        self.snapshot()
            .await?
            .node(id)
            .cloned()
            .ok_or_else(|| TwinError::NotFound(format!("node {}", id)))
    }

    pub async fn node_type(&self, id: &str) -> TwinResult<Option<NodeType>> {
        Ok(self.snapshot().await?.node(id).map(|n| n.node_type))
    }

    /// Fail with a validation error unless `id` is a known k3s node
    pub async fn require_k3s(&self, id: &str) -> TwinResult<()> {
        match self.node_type(id).await? {
            Some(NodeType::K3sNode) => Ok(()),
            Some(_) => Err(TwinError::invalid_node_type(id, NodeType::K3sNode.as_str())),
            None => Err(TwinError::Validation(format!("unknown node: {}", id))),
        }
    }

    /// Ids of every k3s node, in graph order
    pub async fn k3s_nodes(&self) -> TwinResult<Vec<String>> {
        Ok(self
            .snapshot()
            .await?
            .nodes
            .into_iter()
            .filter(|n| n.is_k3s())
            .map(|n| n.id)
            .collect())
    }

    /// Merge freshly sampled loads. Only k3s nodes are kept; nodes missing
    /// from `loads` keep their previous category.
    pub async fn apply_load_colors(&self, loads: LoadMap) {
        let k3s: Vec<String> = match self.snapshot.read().await.as_ref() {
            Some(t) => t.nodes.iter().filter(|n| n.is_k3s()).map(|n| n.id.clone()).collect(),
            None => Vec::new(),
        };

        let mut current = self.loads.write().await;
        for (node, load) in loads {
            if k3s.contains(&node) {
                current.insert(node, load);
            }
        }
    }

    pub async fn loads(&self) -> LoadMap {
        self.loads.read().await.clone()
    }

    /// Positioned and colored rendering of the current snapshot
    pub async fn view(&self) -> TwinResult<TopologyView> {
        let topology = self.snapshot().await?;
        let loads = self.loads().await;
        let positions = compute_layout(&topology.nodes);

        let nodes = topology
            .nodes
            .into_iter()
            .zip(positions)
            .map(|(node, pos)| {
                let load = loads.get(&node.id).copied();
                let base = color_for(
                    node.node_type,
                    node.container.is_running(),
                    node.container.has_monitoring(),
                );
                NodeView {
                    color: with_load(node.node_type, base, load.map(|l| l.category)),
                    x: pos.x,
                    y: pos.y,
                    load,
                    node,
                }
            })
            .collect();

        Ok(TopologyView {
            name: topology.name,
            nodes,
            links: topology.links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerState, LoadCategory};
    use crate::testing::{sample_topology, StaticStatusProbe, StaticTopologySource};

    fn load(percent: f64) -> NodeLoad {
        NodeLoad {
            cpu_percent: percent,
            category: LoadCategory::from_utilization(percent),
        }
    }

    #[tokio::test]
    async fn test_load_applies_statuses() {
        let probe = StaticStatusProbe::new();
        probe.set("serf1", ContainerState::Running, true);
        probe.set("serf2", ContainerState::Stopped, false);

        let store = TopologyStore::new(Arc::new(StaticTopologySource::new(sample_topology())))
            .with_probe(Arc::new(probe));
        let topology = store.load().await.unwrap();

        assert!(topology.node("serf1").unwrap().container.is_running());
        assert_eq!(
            topology.node("serf2").unwrap().container.status,
            ContainerState::Stopped
        );
        assert_eq!(
            topology.node("serf3").unwrap().container.status,
            ContainerState::Unknown
        );
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_fatal() {
        let probe = StaticStatusProbe::new();
        probe.fail();

        let store = TopologyStore::new(Arc::new(StaticTopologySource::new(sample_topology())))
            .with_probe(Arc::new(probe));
        let topology = store.load().await.unwrap();

        assert!(topology
            .nodes
            .iter()
            .all(|n| n.container.status == ContainerState::Unknown));
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_stale_statuses() {
        let probe = Arc::new(StaticStatusProbe::new());
        probe.set("serf1", ContainerState::Running, true);

        let store = TopologyStore::new(Arc::new(StaticTopologySource::new(sample_topology())))
            .with_probe(probe.clone());
        store.load().await.unwrap();
        assert!(store.node("serf1").await.unwrap().container.is_running());

        probe.fail();
        assert!(matches!(
            store.refresh_status().await,
            Err(TwinError::Fetch(_))
        ));

        let serf1 = store.node("serf1").await.unwrap();
        assert_eq!(serf1.container.status, ContainerState::Unknown);
        assert!(serf1.container.urls.is_empty());
    }

    #[tokio::test]
    async fn test_containers_sorted_and_empty_without_probe() {
        let source = Arc::new(StaticTopologySource::new(sample_topology()));
        assert!(TopologyStore::new(source.clone())
            .containers()
            .await
            .unwrap()
            .is_empty());

        let probe = StaticStatusProbe::new();
        probe.set("serf2", ContainerState::Running, false);
        probe.set("serf1", ContainerState::Stopped, false);
        let store = TopologyStore::new(source).with_probe(Arc::new(probe));

        let names: Vec<String> = store
            .containers()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.node_name)
            .collect();
        assert_eq!(names, vec!["serf1", "serf2"]);
    }

    #[tokio::test]
    async fn test_source_failure_is_fetch_error() {
        let source = StaticTopologySource::new(sample_topology());
        source.fail();
        let store = TopologyStore::new(Arc::new(source));

        assert!(matches!(store.load().await, Err(TwinError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_require_k3s() {
        let store = TopologyStore::new(Arc::new(StaticTopologySource::new(sample_topology())));

        store.require_k3s("serf1").await.unwrap();
        assert!(matches!(
            store.require_k3s("r1").await,
            Err(TwinError::Validation(_))
        ));
        assert!(matches!(
            store.require_k3s("ghost").await,
            Err(TwinError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_view_colors_by_status_and_load() {
        let probe = StaticStatusProbe::new();
        probe.set("serf1", ContainerState::Running, true);
        probe.set("serf2", ContainerState::Running, false);

        let store = TopologyStore::new(Arc::new(StaticTopologySource::new(sample_topology())))
            .with_probe(Arc::new(probe));
        store.load().await.unwrap();

        let mut loads = LoadMap::new();
        loads.insert("serf1".to_string(), load(85.0));
        loads.insert("r1".to_string(), load(90.0));
        store.apply_load_colors(loads).await;

        let view = store.view().await.unwrap();
        let get = |id: &str| view.nodes.iter().find(|n| n.node.id == id).unwrap();

        let serf1 = get("serf1");
        assert_eq!(serf1.color.background, color::K3S_MONITORED_GREEN);
        assert_eq!(serf1.color.border, color::LOAD_RED);

        assert_eq!(get("serf2").color.background, color::K3S_UNMONITORED_ORANGE);
        assert_eq!(get("serf3").color.background, color::K3S_STOPPED_GREY);

        let r1 = get("r1");
        assert_eq!(r1.color.border, color::ROUTER_RED);
        assert!(r1.load.is_none());
    }

    #[tokio::test]
    async fn test_missing_loads_keep_previous_category() {
        let store = TopologyStore::new(Arc::new(StaticTopologySource::new(sample_topology())));
        store.load().await.unwrap();

        let mut first = LoadMap::new();
        first.insert("serf1".to_string(), load(65.0));
        first.insert("serf2".to_string(), load(30.0));
        store.apply_load_colors(first).await;

        let mut second = LoadMap::new();
        second.insert("serf2".to_string(), load(85.0));
        store.apply_load_colors(second).await;

        let loads = store.loads().await;
        assert_eq!(loads["serf1"].category, LoadCategory::Amber);
        assert_eq!(loads["serf2"].category, LoadCategory::Red);
    }
}
