//! API client for the testbed orchestrator

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the orchestrator HTTP surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        self.send(self.client.get(url)).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.url(path)?;
        self.send(self.client.get(url).query(query)).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path)?;
        self.send(self.client.post(url).json(body)).await
    }

    /// Make a DELETE request, with a JSON body when given
    pub async fn delete<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.url(path)?;
        let request = match body {
            Some(body) => self.client.delete(url).json(body),
            None => self.client.delete(url),
        };
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{}", describe_error(status.as_u16(), &body));
        }

        response.json().await.context("Failed to parse response")
    }
}

/// Render an error response, preferring the orchestrator's error body
pub fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => {
            let mut message = format!("{} ({}): {}", err.kind, status, err.error);
            if !err.completed.is_empty() {
                message.push_str(&format!("\n  completed: {}", err.completed.join(", ")));
            }
            for failure in &err.failed {
                message.push_str(&format!("\n  - {}: {}", failure.target, failure.reason));
            }
            message
        }
        Err(_) => format!("API error ({}): {}", status, body),
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<FailedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedStep {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyView {
    pub name: String,
    pub nodes: Vec<NodeView>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub kind: String,
    #[serde(default)]
    pub container: ContainerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<NodeLoad>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub status: String,
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeLoad {
    pub cpu_percent: f64,
    pub category: LoadCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadCategory {
    Green,
    Amber,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub state: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConnection {
    pub from: String,
    pub to: String,
    pub state: String,
    pub created_at: String,
    pub confirms_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub connection: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalResponse {
    pub connection: Connection,
    pub deleted_pods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingResponse {
    pub pending: PendingConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPod {
    pub id: String,
    pub source_node: String,
    pub dest_node: String,
    pub namespace: String,
    pub source_pod_name: String,
    pub dest_pod_name: String,
    pub workload_file: String,
    pub interval: u64,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPodList {
    pub virtual_pods: Vec<VirtualPod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPodResponse {
    pub virtual_pod: VirtualPod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePodRequest {
    pub source_node: String,
    pub dest_node: String,
    pub workload_file: String,
    pub interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadTemplate {
    pub filename: String,
    pub name: String,
    pub time_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateList {
    pub templates: Vec<WorkloadTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTimeseries {
    pub node: String,
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulated: Option<MetricSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real: Option<MetricSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    pub service: String,
    pub container_port: u16,
    pub host_port: u16,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub container_id: String,
    pub container_name: String,
    pub node_name: String,
    pub state: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerList {
    pub containers: Vec<ContainerInfo>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuUsage {
    pub percent: f64,
    pub cores: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemStatus {
    pub cpu: CpuUsage,
    pub memory: Usage,
    #[serde(default)]
    pub disk: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_error_uses_error_body() {
        let body = r#"{"success":false,"error":"unknown node: ghost","kind":"validation"}"#;
        assert_eq!(
            describe_error(400, body),
            "validation (400): unknown node: ghost"
        );
    }

    #[test]
    fn test_describe_error_lists_failed_steps() {
        let body = r#"{"success":false,"error":"1 of 3 steps failed","kind":"partial_failure",
            "completed":["a","b"],"failed":[{"target":"replay 4001","reason":"still running"}]}"#;
        let message = describe_error(500, body);
        assert!(message.starts_with("partial_failure (500)"));
        assert!(message.contains("- replay 4001: still running"));
    }

    #[test]
    fn test_describe_error_falls_back_to_raw_body() {
        assert_eq!(describe_error(502, "Bad Gateway"), "API error (502): Bad Gateway");
    }

    #[test]
    fn test_node_view_ignores_layout_fields() {
        let json = r##"{"id":"serf1","label":"serf1","type":"k3s-node","kind":"k8s-kind",
            "container":{"status":"running","urls":{}},"x":0.0,"y":-300.0,
            "color":{"background":"#fff","border":"#000"},
            "load":{"cpu_percent":72.5,"category":"amber"}}"##;
        let node: NodeView = serde_json::from_str(json).unwrap();
        assert_eq!(node.node_type, "k3s-node");
        assert_eq!(node.load.unwrap().category, LoadCategory::Amber);
    }

    #[test]
    fn test_system_status_without_disk() {
        let json = r#"{"cpu":{"percent":12.5,"cores":8},
            "memory":{"percent":40.0,"used_gb":6.4,"total_gb":16.0}}"#;
        let status: SystemStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.cpu.cores, 8);
        assert!(status.disk.is_none());
    }
}
