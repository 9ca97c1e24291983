//! Topology snapshot sources

use super::TopologySource;
use crate::error::{TwinError, TwinResult};
use crate::models::{Link, Node, NodeType, Topology};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ClabFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    topology: ClabTopology,
}

#[derive(Debug, Default, Deserialize)]
struct ClabTopology {
    #[serde(default)]
    nodes: BTreeMap<String, ClabNode>,
    #[serde(default)]
    links: Vec<ClabLink>,
}

#[derive(Debug, Default, Deserialize)]
struct ClabNode {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClabLink {
    #[serde(default)]
    endpoints: Vec<String>,
}

/// Classify a containerlab node by its kind and image
pub fn classify(kind: &str, image: &str) -> NodeType {
    let image = image.to_lowercase();
    if image.contains("frr") || image.contains("router") {
        NodeType::Router
    } else if image.contains("k3s") || image.contains("serf") {
        NodeType::K3sNode
    } else if image.contains("switch") || kind == "vr-sros" {
        NodeType::Switch
    } else {
        NodeType::Generic
    }
}

/// Reads the containerlab topology definition from disk
pub struct ClabTopologySource {
    path: PathBuf,
}

impl ClabTopologySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self) -> TwinResult<Topology> {
        let file: ClabFile = config::Config::builder()
            .add_source(
                config::File::from(self.path.as_path()).format(config::FileFormat::Yaml),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                TwinError::Fetch(format!(
                    "failed to read topology {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        let nodes = file
            .topology
            .nodes
            .into_iter()
            .map(|(id, spec)| {
                let kind = spec.kind.unwrap_or_else(|| "linux".to_string());
                let node_type = classify(&kind, spec.image.as_deref().unwrap_or_default());
                Node {
                    label: id.clone(),
                    id,
                    node_type,
                    kind,
                    container: Default::default(),
                }
            })
            .collect::<Vec<_>>();

        let links = file
            .topology
            .links
            .into_iter()
            .filter_map(|link| {
                let mut ends = link
                    .endpoints
                    .iter()
                    .map(|e| e.split(':').next().unwrap_or(e).to_string());
                match (ends.next(), ends.next()) {
                    (Some(source), Some(target)) => Some(Link { source, target }),
                    _ => None,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            path = %self.path.display(),
            nodes = nodes.len(),
            links = links.len(),
            "Parsed containerlab topology"
        );

        Ok(Topology {
            name: file.name.unwrap_or_else(|| "emulation".to_string()),
            nodes,
            links,
        })
    }
}

#[async_trait]
impl TopologySource for ClabTopologySource {
    async fn fetch(&self) -> TwinResult<Topology> {
        self.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CLAB: &str = r#"
name: emulation
topology:
  nodes:
    r1:
      kind: linux
      image: frrouting/frr:v8.4.1
    sw1:
      kind: bridge
      image: network-switch:latest
    serf1:
      kind: linux
      image: k3s-serf:latest
    serf2:
      kind: linux
      image: k3s-serf:latest
    host:
      kind: linux
      image: alpine:3
  links:
    - endpoints: ["r1:eth1", "sw1:eth1"]
    - endpoints: ["sw1:eth2", "serf1:eth1"]
    - endpoints: ["sw1:eth3", "serf2:eth1"]
"#;

    fn write_topology(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify("linux", "frrouting/frr:v8"), NodeType::Router);
        assert_eq!(classify("linux", "my-router"), NodeType::Router);
        assert_eq!(classify("linux", "rancher/k3s"), NodeType::K3sNode);
        assert_eq!(classify("linux", "serf-node"), NodeType::K3sNode);
        assert_eq!(classify("vr-sros", "vrnetlab/sros"), NodeType::Switch);
        assert_eq!(classify("linux", "alpine"), NodeType::Generic);
    }

    #[tokio::test]
    async fn test_parse_containerlab_file() {
        let file = write_topology(CLAB);
        let source = ClabTopologySource::new(file.path());

        let topology = source.fetch().await.unwrap();
        assert_eq!(topology.name, "emulation");
        assert_eq!(topology.nodes.len(), 5);
        assert_eq!(topology.links.len(), 3);

        let serf1 = topology.node("serf1").unwrap();
        assert!(serf1.is_k3s());
        assert_eq!(topology.node("r1").unwrap().node_type, NodeType::Router);
        assert_eq!(topology.node("sw1").unwrap().node_type, NodeType::Switch);
        assert_eq!(topology.node("host").unwrap().node_type, NodeType::Generic);

        assert!(topology
            .links
            .iter()
            .any(|l| l.source == "sw1" && l.target == "serf2"));
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let source = ClabTopologySource::new("/nonexistent/topology.clab.yml");
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, TwinError::Fetch(_)));
    }
}
