//! Access to the emulated k3s clusters
//!
//! Every emulated k3s node runs its own cluster inside a container. This
//! module places and removes synthetic pods there and reads back cluster
//! state for node detail views.

pub mod exec;
mod inspect;
mod manifest;

pub use exec::{run_command, CommandOutput, DockerExec};
pub use inspect::{parse_emulation_config, parse_list, summarize, ItemList};
pub use manifest::{namespace, PodRole, SyntheticPod, KWOK_TOLERATION_KEY};

use crate::error::{TwinError, TwinResult};
use crate::models::{ClusterInfo, EmulationResource};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use tracing::{debug, info};

/// Operations against the cluster embedded in a k3s node
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Make sure `namespace` exists on `node`.
    /// Fails with [`TwinError::Resource`] when the cluster is not usable.
    async fn ensure_namespace(&self, node: &str, namespace: &str) -> TwinResult<()>;

    /// Create or update a synthetic pod on `node`
    async fn apply_pod(&self, node: &str, pod: &SyntheticPod) -> TwinResult<()>;

    /// Force-delete a synthetic pod. Deleting a missing pod succeeds.
    async fn delete_pod(&self, node: &str, namespace: &str, name: &str) -> TwinResult<()>;

    async fn cluster_info(&self, node: &str) -> TwinResult<ClusterInfo>;

    async fn emulation_config(&self, node: &str) -> TwinResult<Vec<EmulationResource>>;
}

/// [`ClusterOps`] over `docker exec <container> k3s kubectl`
pub struct DockerKubectl {
    exec: DockerExec,
    annotations_dir: String,
}

impl DockerKubectl {
    pub fn new(exec: DockerExec, annotations_dir: impl Into<String>) -> Self {
        Self {
            exec,
            annotations_dir: annotations_dir.into(),
        }
    }

    async fn get_json(&self, node: &str, args: &[&str]) -> TwinResult<String> {
        let mut full = vec!["get"];
        full.extend_from_slice(args);
        full.extend_from_slice(&["-o", "json"]);
        let out = self
            .exec
            .kubectl(node, &full, None)
            .await
            .map_err(|e| TwinError::Fetch(e.to_string()))?;
        if !out.success() {
            return Err(TwinError::Fetch(format!(
                "kubectl get {} on {} failed: {}",
                args.join(" "),
                node,
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }
}

#[async_trait]
impl ClusterOps for DockerKubectl {
    async fn ensure_namespace(&self, node: &str, name: &str) -> TwinResult<()> {
        let exists = self
            .exec
            .kubectl(node, &["get", "namespace", name], None)
            .await
            .map(|o| o.success())
            .map_err(|e| TwinError::Resource(format!("cluster on {} unreachable: {}", node, e)))?;
        if exists {
            return Ok(());
        }

        let manifest = serde_json::to_vec(&namespace(name))?;
        let out = self
            .exec
            .kubectl(node, &["apply", "-f", "-"], Some(&manifest))
            .await
            .map_err(|e| TwinError::Resource(e.to_string()))?;
        if !out.success() {
            return Err(TwinError::Resource(format!(
                "cannot create namespace {} on {}: {}",
                name,
                node,
                out.stderr.trim()
            )));
        }
        info!(node = %node, namespace = %name, "Created namespace");
        Ok(())
    }

    async fn apply_pod(&self, node: &str, pod: &SyntheticPod) -> TwinResult<()> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let manifest = serde_json::to_vec(&pod.to_pod(&timestamp))?;
        let out = self
            .exec
            .kubectl(node, &["apply", "-f", "-"], Some(&manifest))
            .await
            .map_err(|e| TwinError::Resource(e.to_string()))?;
        if !out.success() {
            return Err(TwinError::Resource(format!(
                "cannot place {}/{} on {}: {}",
                pod.namespace,
                pod.name,
                node,
                out.stderr.trim()
            )));
        }
        debug!(node = %node, pod = %pod.name, role = pod.role.as_str(), "Applied synthetic pod");
        Ok(())
    }

    async fn delete_pod(&self, node: &str, namespace: &str, name: &str) -> TwinResult<()> {
        self.exec
            .kubectl(
                node,
                &[
                    "delete",
                    "pod",
                    name,
                    "-n",
                    namespace,
                    "--force",
                    "--grace-period=0",
                    "--ignore-not-found",
                ],
                None,
            )
            .await?
            .check(&format!("delete pod {}/{} on {}", namespace, name, node))?;
        Ok(())
    }

    async fn cluster_info(&self, node: &str) -> TwinResult<ClusterInfo> {
        let namespaces: Vec<Namespace> =
            parse_list("namespace", &self.get_json(node, &["namespaces"]).await?)?;
        let nodes: Vec<Node> = parse_list("node", &self.get_json(node, &["nodes"]).await?)?;
        let pods: Vec<Pod> =
            parse_list("pod", &self.get_json(node, &["pods", "--all-namespaces"]).await?)?;

        Ok(summarize(node, namespaces, nodes, pods))
    }

    async fn emulation_config(&self, node: &str) -> TwinResult<Vec<EmulationResource>> {
        let path = format!(
            "{}/emulation_config.json",
            self.annotations_dir.trim_end_matches('/')
        );
        let out = self.exec.exec(node, &["cat", &path], None).await?;
        if !out.success() {
            return Err(TwinError::NotFound(format!("emulation config on {}", node)));
        }
        parse_emulation_config(&out.stdout)
    }
}
