//! Parsing of cluster listings and emulation settings

use crate::error::{TwinError, TwinResult};
use crate::models::{ClusterInfo, ClusterNodeInfo, ClusterPodInfo, EmulationResource};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// `kubectl get ... -o json` envelope
#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct ItemList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

pub fn parse_list<T: DeserializeOwned>(what: &str, json: &str) -> TwinResult<Vec<T>> {
    serde_json::from_str::<ItemList<T>>(json)
        .map(|l| l.items)
        .map_err(|e| TwinError::Fetch(format!("unexpected {} listing: {}", what, e)))
}

fn node_status(node: &Node) -> String {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|c| c.iter().find(|c| c.type_ == "Ready"));
    match ready {
        Some(c) if c.status == "True" => "Ready".to_string(),
        Some(_) => "NotReady".to_string(),
        None => "Unknown".to_string(),
    }
}

fn node_kind(node: &Node) -> &'static str {
    let is_kwok = node
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get("type"))
        .map(|t| t.contains("kwok"))
        .unwrap_or(false);
    if is_kwok {
        "kwok"
    } else {
        "real"
    }
}

/// Summarize one node's cluster from its namespace, node and pod listings
pub fn summarize(
    node_name: &str,
    namespaces: Vec<Namespace>,
    nodes: Vec<Node>,
    pods: Vec<Pod>,
) -> ClusterInfo {
    let namespaces = namespaces
        .into_iter()
        .filter_map(|ns| ns.metadata.name)
        .collect();

    let nodes = nodes
        .iter()
        .map(|n| ClusterNodeInfo {
            name: n.metadata.name.clone().unwrap_or_default(),
            status: node_status(n),
            node_type: node_kind(n).to_string(),
        })
        .collect();

    let total_pods = pods.len();
    let mut pods_by_namespace: HashMap<String, Vec<ClusterPodInfo>> = HashMap::new();
    for pod in pods {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        pods_by_namespace
            .entry(namespace)
            .or_default()
            .push(ClusterPodInfo {
                name: pod.metadata.name.clone().unwrap_or_default(),
                status: pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                node: pod
                    .spec
                    .as_ref()
                    .and_then(|s| s.node_name.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
            });
    }

    ClusterInfo {
        node_name: node_name.to_string(),
        namespaces,
        nodes,
        pods_by_namespace,
        total_pods,
    }
}

#[derive(Debug, Default, Deserialize)]
struct EmulationConfigFile {
    #[serde(default)]
    node_config: NodeConfig,
}

#[derive(Debug, Default, Deserialize)]
struct NodeConfig {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    single_node: Option<EmulationResource>,
    #[serde(default)]
    per_namespace_nodes: BTreeMap<String, EmulationResource>,
}

/// Resources assigned to synthetic nodes by the emulation config
pub fn parse_emulation_config(json: &str) -> TwinResult<Vec<EmulationResource>> {
    let file: EmulationConfigFile = serde_json::from_str(json)
        .map_err(|e| TwinError::Fetch(format!("invalid emulation config: {}", e)))?;
    let config = file.node_config;

    if config.mode.as_deref() == Some("single") {
        Ok(vec![config.single_node.unwrap_or(EmulationResource {
            name: None,
            cpu: None,
            memory: None,
        })])
    } else {
        Ok(config.per_namespace_nodes.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = r#"{"apiVersion":"v1","kind":"List","items":[
        {"apiVersion":"v1","kind":"Node","metadata":{"name":"serf1","labels":{}},
         "status":{"conditions":[{"type":"Ready","status":"True"}]}},
        {"apiVersion":"v1","kind":"Node","metadata":{"name":"emulation-node-1","labels":{"type":"kwok"}},
         "status":{"conditions":[{"type":"Ready","status":"False"}]}}
    ]}"#;

    const PODS: &str = r#"{"apiVersion":"v1","kind":"List","items":[
        {"apiVersion":"v1","kind":"Pod","metadata":{"name":"virtual-pod-001-dest","namespace":"liqo"},
         "spec":{"nodeName":"emulation-node-1","containers":[]},"status":{"phase":"Running"}},
        {"apiVersion":"v1","kind":"Pod","metadata":{"name":"coredns","namespace":"kube-system"},
         "spec":{"containers":[]}}
    ]}"#;

    const NAMESPACES: &str = r#"{"apiVersion":"v1","kind":"List","items":[
        {"apiVersion":"v1","kind":"Namespace","metadata":{"name":"default"}},
        {"apiVersion":"v1","kind":"Namespace","metadata":{"name":"liqo"}}
    ]}"#;

    #[test]
    fn test_summarize_cluster() {
        let info = summarize(
            "serf2",
            parse_list("namespace", NAMESPACES).unwrap(),
            parse_list("node", NODES).unwrap(),
            parse_list("pod", PODS).unwrap(),
        );

        assert_eq!(info.namespaces, vec!["default", "liqo"]);
        assert_eq!(info.total_pods, 2);
        assert_eq!(info.nodes[0].node_type, "real");
        assert_eq!(info.nodes[0].status, "Ready");
        assert_eq!(info.nodes[1].node_type, "kwok");
        assert_eq!(info.nodes[1].status, "NotReady");

        let liqo = &info.pods_by_namespace["liqo"];
        assert_eq!(liqo[0].status, "Running");
        assert_eq!(liqo[0].node, "emulation-node-1");
        let system = &info.pods_by_namespace["kube-system"];
        assert_eq!(system[0].status, "Unknown");
        assert_eq!(system[0].node, "N/A");
    }

    #[test]
    fn test_empty_listing() {
        let pods: Vec<Pod> = parse_list("pod", "{}").unwrap();
        assert!(pods.is_empty());
        assert!(parse_list::<Pod>("pod", "garbage").is_err());
    }

    #[test]
    fn test_emulation_config_modes() {
        let single = parse_emulation_config(
            r#"{"node_config":{"mode":"single","single_node":{"name":"emulation-node-1","cpu":"8","memory":"16Gi"}}}"#,
        )
        .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].name.as_deref(), Some("emulation-node-1"));

        let per_ns = parse_emulation_config(
            r#"{"node_config":{"mode":"per_namespace","per_namespace_nodes":{
                "b":{"name":"node-b","cpu":4,"memory":"8Gi"},
                "a":{"name":"node-a","cpu":2,"memory":"4Gi"}}}}"#,
        )
        .unwrap();
        assert_eq!(per_ns.len(), 2);
        assert_eq!(per_ns[0].name.as_deref(), Some("node-a"));
        assert_eq!(per_ns[0].cpu, Some(serde_json::json!(2)));
    }
}
