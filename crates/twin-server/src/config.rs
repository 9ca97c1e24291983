//! Orchestrator configuration
//!
//! Values come from an optional `twinbed.{yaml,toml,json}` file (or the file
//! named by `TWIN_CONFIG`) overlaid by `TWIN__<SECTION>__<FIELD>` environment
//! variables. Every field has a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use twin_lib::pods::PodSettings;
use twin_lib::topology::MonitoringLinks;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwinConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub pods: PodsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    /// Containerlab topology file
    #[serde(default = "default_topology_file")]
    pub file: String,
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    #[serde(default = "default_status_poll")]
    pub status_poll_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub grafana: GrafanaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_localhost")]
    pub host: String,
    #[serde(default = "default_prometheus_port")]
    pub port: u16,
    /// Host used in links handed to browsers; defaults to `host`
    #[serde(default)]
    pub public_host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrafanaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_localhost")]
    pub host: String,
    #[serde(default = "default_grafana_port")]
    pub port: u16,
    #[serde(default = "default_dashboard_uid")]
    pub dashboard_uid: String,
    #[serde(default)]
    pub public_host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_connections_file")]
    pub connections_file: String,
    #[serde(default = "default_registry_file")]
    pub registry_file: String,
    #[serde(default = "default_templates_dir")]
    pub workload_templates_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default = "default_confirm_dwell")]
    pub confirm_dwell_millis: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodsConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_kwok_node")]
    pub kwok_node: String,
    #[serde(default = "default_annotations_dir")]
    pub annotations_dir: String,
    #[serde(default = "default_replay_script")]
    pub replay_script: String,
    /// Bounded wait for replay start/stop confirmation
    #[serde(default = "default_process_timeout")]
    pub process_timeout_secs: u64,
    /// Timeout of a single `docker exec`
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_load_sample")]
    pub load_sample_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_topology_file() -> String {
    "topology.clab.yml".to_string()
}

fn default_container_prefix() -> String {
    "clab-emulation".to_string()
}

fn default_status_poll() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_localhost() -> String {
    "localhost".to_string()
}

fn default_prometheus_port() -> u16 {
    9091
}

fn default_grafana_port() -> u16 {
    3000
}

fn default_dashboard_uid() -> String {
    "emulation".to_string()
}

fn default_connections_file() -> String {
    "liqo_connections.json".to_string()
}

fn default_registry_file() -> String {
    "virtual_pods_registry.json".to_string()
}

fn default_templates_dir() -> String {
    "workload_templates".to_string()
}

fn default_confirm_dwell() -> u64 {
    10_000
}

fn default_namespace() -> String {
    "liqo".to_string()
}

fn default_kwok_node() -> String {
    "emulation-node-1".to_string()
}

fn default_annotations_dir() -> String {
    "/opt/annotations".to_string()
}

fn default_replay_script() -> String {
    "replay_virtual_pod.py".to_string()
}

fn default_process_timeout() -> u64 {
    10
}

fn default_exec_timeout() -> u64 {
    30
}

fn default_load_sample() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            file: default_topology_file(),
            container_prefix: default_container_prefix(),
            status_poll_secs: default_status_poll(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_localhost(),
            port: default_prometheus_port(),
            public_host: None,
        }
    }
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_localhost(),
            port: default_grafana_port(),
            dashboard_uid: default_dashboard_uid(),
            public_host: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connections_file: default_connections_file(),
            registry_file: default_registry_file(),
            workload_templates_dir: default_templates_dir(),
        }
    }
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            confirm_dwell_millis: default_confirm_dwell(),
        }
    }
}

impl Default for PodsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            kwok_node: default_kwok_node(),
            annotations_dir: default_annotations_dir(),
            replay_script: default_replay_script(),
            process_timeout_secs: default_process_timeout(),
            exec_timeout_secs: default_exec_timeout(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            load_sample_secs: default_load_sample(),
        }
    }
}

impl TwinConfig {
    /// Load from the config file (if present) and the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("TWIN_CONFIG").unwrap_or_else(|_| "twinbed".to_string());
        Self::load_from(&file, config::Environment::with_prefix("TWIN"))
    }

    /// Load from `file` (extension optional, may be absent) overlaid by `env`
    pub fn load_from(file: &str, env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(env.separator("__").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject periods and timeouts that would spin or never wait
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("topology.status_poll_secs", self.topology.status_poll_secs),
            ("monitor.load_sample_secs", self.monitor.load_sample_secs),
            ("pods.process_timeout_secs", self.pods.process_timeout_secs),
            ("pods.exec_timeout_secs", self.pods.exec_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                anyhow::bail!("Invalid configuration: {} must be greater than 0", field);
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Prometheus API base URL, if the backend is enabled
    pub fn prometheus_url(&self) -> Option<String> {
        let p = &self.monitoring.prometheus;
        p.enabled.then(|| format!("http://{}:{}", p.host, p.port))
    }

    /// Browser-facing links attached to node statuses
    pub fn monitoring_links(&self) -> MonitoringLinks {
        let p = &self.monitoring.prometheus;
        let g = &self.monitoring.grafana;
        MonitoringLinks {
            grafana: g.enabled.then(|| {
                let host = g.public_host.as_deref().unwrap_or(&g.host);
                (format!("http://{}:{}", host, g.port), g.dashboard_uid.clone())
            }),
            prometheus: p.enabled.then(|| {
                let host = p.public_host.as_deref().unwrap_or(&p.host);
                format!("http://{}:{}", host, p.port)
            }),
        }
    }

    pub fn pod_settings(&self) -> PodSettings {
        PodSettings {
            namespace: self.pods.namespace.clone(),
            kwok_node: self.pods.kwok_node.clone(),
        }
    }

    pub fn confirm_dwell(&self) -> Duration {
        Duration::from_millis(self.connections.confirm_dwell_millis)
    }
}
