//! Container status probing and monitoring links

use super::StatusProbe;
use crate::cluster::exec::run_command;
use crate::error::TwinResult;
use crate::metrics::{selector, EMULATED_NODE_PREFIX, NODE_LABEL};
use crate::models::{ContainerInfo, ContainerState, ContainerStatus, PortMapping};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;
use url::form_urlencoded::byte_serialize;

/// Public endpoints used to build per-node monitoring links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringLinks {
    /// Grafana base URL and dashboard uid
    pub grafana: Option<(String, String)>,
    /// Prometheus base URL
    pub prometheus: Option<String>,
}

impl MonitoringLinks {
    /// Monitoring URLs for `node`, keyed by endpoint name
    pub fn for_node(&self, node: &str) -> HashMap<String, String> {
        let mut urls = HashMap::new();
        let node_param: String = byte_serialize(node.as_bytes()).collect();

        if let Some((base, uid)) = &self.grafana {
            let dashboard = format!(
                "{}/d/{}/emulation?var-Node={}&from=now-1h&to=now",
                base.trim_end_matches('/'),
                uid,
                node_param
            );
            urls.insert("grafana".to_string(), dashboard.clone());
            urls.insert("monitoring".to_string(), dashboard);
        }

        if let Some(base) = &self.prometheus {
            let expr = selector(
                &format!("{}_cpu_percent", EMULATED_NODE_PREFIX),
                &[(NODE_LABEL, node)],
            );
            let expr: String = byte_serialize(expr.as_bytes()).collect();
            urls.insert(
                "prometheus".to_string(),
                format!(
                    "{}/graph?g0.expr={}&g0.tab=0&g0.range_input=1h",
                    base.trim_end_matches('/'),
                    expr
                ),
            );
        }

        urls
    }
}

/// Label containerlab puts on every node container
const CLAB_LABEL: &str = "containerlab";
const CLAB_NODE_LABEL: &str = "clab-node-name";

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn container_state(state: &str) -> ContainerState {
    match state {
        "running" => ContainerState::Running,
        "exited" | "created" | "paused" | "dead" | "removing" | "restarting" => {
            ContainerState::Stopped
        }
        _ => ContainerState::Unknown,
    }
}

fn parse_labels(labels: &str) -> BTreeMap<String, String> {
    labels
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn service_name(container_port: u16) -> String {
    match container_port {
        9090 => "prometheus".to_string(),
        3000 => "grafana".to_string(),
        port => format!("port_{}", port),
    }
}

/// Parse the `Ports` column, e.g. `0.0.0.0:9091->9090/tcp, :::9091->9090/tcp, 22/tcp`.
///
/// Unpublished ports and port ranges are skipped; the first binding of a
/// container port wins.
pub fn parse_ports(ports: &str) -> Vec<PortMapping> {
    let mut mappings: Vec<PortMapping> = Vec::new();
    for entry in ports.split(',').map(str::trim) {
        let Some((host, target)) = entry.split_once("->") else {
            continue;
        };
        let Some((_, host_port)) = host.rsplit_once(':') else {
            continue;
        };
        let (container_port, protocol) = target.split_once('/').unwrap_or((target, "tcp"));
        let (Ok(host_port), Ok(container_port)) =
            (host_port.parse::<u16>(), container_port.parse::<u16>())
        else {
            continue;
        };
        if mappings
            .iter()
            .any(|m| m.container_port == container_port && m.protocol == protocol)
        {
            continue;
        }
        mappings.push(PortMapping {
            service: service_name(container_port),
            container_port,
            host_port,
            protocol: protocol.to_string(),
        });
    }
    mappings
}

/// Node name of a containerlab container: the `clab-node-name` label, else
/// the `<node>` part of `clab-<topology>-<node>`, else the full name for a
/// labelled container. `None` for unrelated containers.
fn node_name(name: &str, labels: &BTreeMap<String, String>) -> Option<String> {
    if let Some(node) = labels.get(CLAB_NODE_LABEL).filter(|n| !n.is_empty()) {
        return Some(node.clone());
    }
    let mut parts = name.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("clab"), Some(_), Some(node)) if !node.is_empty() => Some(node.to_string()),
        _ if labels.contains_key(CLAB_LABEL) => Some(name.to_string()),
        _ => None,
    }
}

/// Parse `docker ps --format '{{json .}}'` output into containerlab
/// containers. Unrelated containers and unparsable lines are skipped.
pub fn parse_containers(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<PsLine>(line).ok())
        .filter_map(|ps| {
            let labels = parse_labels(&ps.labels);
            let node_name = node_name(&ps.names, &labels)?;
            Some(ContainerInfo {
                container_id: ps.id.chars().take(12).collect(),
                container_name: ps.names,
                node_name,
                state: container_state(&ps.state),
                status: ps.status,
                image: ps.image,
                labels,
                ports: parse_ports(&ps.ports),
            })
        })
        .collect()
}

/// Parse `docker ps --format '{{json .}}'` output into per-node statuses
pub fn parse_docker_ps(output: &str, links: &MonitoringLinks) -> HashMap<String, ContainerStatus> {
    parse_containers(output)
        .into_iter()
        .map(|c| {
            let status = ContainerStatus {
                status: c.state,
                urls: links.for_node(&c.node_name),
            };
            (c.node_name, status)
        })
        .collect()
}

/// Probes node containers through the docker CLI
pub struct DockerStatusProbe {
    links: MonitoringLinks,
    timeout: Duration,
}

impl DockerStatusProbe {
    pub fn new(links: MonitoringLinks, timeout: Duration) -> Self {
        Self { links, timeout }
    }

    async fn docker_ps(&self) -> TwinResult<String> {
        let output = run_command(
            "docker",
            &["ps", "--all", "--no-trunc", "--format", "{{json .}}"],
            None,
            self.timeout,
        )
        .await?
        .check("docker ps")?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl StatusProbe for DockerStatusProbe {
    async fn probe(&self) -> TwinResult<HashMap<String, ContainerStatus>> {
        let statuses = parse_docker_ps(&self.docker_ps().await?, &self.links);
        debug!(containers = statuses.len(), "Probed container statuses");
        Ok(statuses)
    }

    async fn containers(&self) -> TwinResult<Vec<ContainerInfo>> {
        let containers = parse_containers(&self.docker_ps().await?);
        debug!(containers = containers.len(), "Listed node containers");
        Ok(containers)
    }
}
