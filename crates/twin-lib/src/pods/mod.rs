//! Virtual pod lifecycle
//!
//! A virtual pod is a pair of synthetic pods (one on each end of a confirmed
//! connection) plus a replay process on the destination that drives the
//! destination pod's telemetry from a workload template.
//!
//! Creation holds the connection's pair lock for its whole duration, so a
//! concurrent connection removal either sees the finished pod or runs before
//! the connection check. Lock order is always pair, then pod id.

mod replay;


pub use replay::{ContainerReplayer, ReplayConfig, Replayer};

use crate::cluster::{ClusterOps, PodRole, SyntheticPod};
use crate::connections::ConnectionTable;
use crate::error::{StepFailure, TwinError, TwinResult};
use crate::models::{
    CreatePodRequest, NodePair, PodStatus, ReplayHandle, VirtualPod, WorkloadProfile,
};
use crate::observability::{StructuredLogger, TwinMetrics};
use crate::store::{JsonFile, KeyedLocks};
use crate::topology::TopologyStore;
use crate::workload::WorkloadCatalog;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// On-disk registry document
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PodRegistry {
    #[serde(default)]
    pub virtual_pods: Vec<VirtualPod>,
}

/// Placement settings shared by every virtual pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSettings {
    pub namespace: String,
    pub kwok_node: String,
}

impl Default for PodSettings {
    fn default() -> Self {
        Self {
            namespace: "liqo".to_string(),
            kwok_node: "emulation-node-1".to_string(),
        }
    }
}

/// Collaborators a [`PodLifecycleManager`] drives
pub struct PodDeps {
    pub topology: Arc<TopologyStore>,
    pub connections: Arc<ConnectionTable>,
    pub catalog: Arc<WorkloadCatalog>,
    pub cluster: Arc<dyn ClusterOps>,
    pub replayer: Arc<dyn Replayer>,
}

pub struct PodLifecycleManager {
    deps: PodDeps,
    settings: PodSettings,
    pods: DashMap<String, VirtualPod>,
    locks: KeyedLocks<String>,
    next_id: AtomicU32,
    file: JsonFile<PodRegistry>,
    logger: StructuredLogger,
    metrics: TwinMetrics,
}

/// Numeric part of a `vp-NNN` id
fn id_number(id: &str) -> Option<u32> {
    id.rsplit('-').next()?.parse().ok()
}

impl PodLifecycleManager {
    /// Open the manager, restoring registered pods from `file`
    pub async fn open(
        deps: PodDeps,
        settings: PodSettings,
        file: JsonFile<PodRegistry>,
        logger: StructuredLogger,
    ) -> TwinResult<Self> {
        let registry = file.load().await?;
        let pods = DashMap::new();
        let mut max_id = 0;
        for pod in registry.virtual_pods {
            max_id = max_id.max(id_number(&pod.id).unwrap_or(0));
            pods.insert(pod.id.clone(), pod);
        }
        debug!(path = %file.path().display(), pods = pods.len(), "Loaded virtual pod registry");

        let manager = Self {
            deps,
            settings,
            pods,
            locks: KeyedLocks::new(),
            next_id: AtomicU32::new(max_id + 1),
            file,
            logger,
            metrics: TwinMetrics::new(),
        };
        manager.update_gauge();
        Ok(manager)
    }

    /// Snapshot of every pod, ordered by id
    pub fn list(&self) -> Vec<VirtualPod> {
        let mut all: Vec<VirtualPod> = self.pods.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn get(&self, id: &str) -> Option<VirtualPod> {
        self.pods.get(id).map(|p| p.clone())
    }

    /// Pods bound to the connection between `pair`'s nodes, in either direction
    pub fn pods_for_pair(&self, pair: &NodePair) -> Vec<VirtualPod> {
        self.list()
            .into_iter()
            .filter(|p| &p.pair() == pair)
            .collect()
    }

    /// Create a virtual pod over the confirmed connection `source`↔`dest`.
    ///
    /// The record becomes visible as `Creating` and turns `Running` (and is
    /// persisted) only after the replayer confirmed its start. On any
    /// failure the partial placement is rolled back and no record remains.
    pub async fn create(&self, req: CreatePodRequest) -> TwinResult<VirtualPod> {
        if req.source_node == req.dest_node {
            return Err(TwinError::Validation(
                "source and destination must be different nodes".to_string(),
            ));
        }
        if req.interval == 0 {
            return Err(TwinError::Validation("interval must be at least 1 second".to_string()));
        }
        self.deps.topology.require_k3s(&req.source_node).await?;
        self.deps.topology.require_k3s(&req.dest_node).await?;

        let pair = NodePair::new(&req.source_node, &req.dest_node);
        let _pair_guard = self.deps.connections.lock_pair(&pair).await;
        if !self.deps.connections.exists(&req.source_node, &req.dest_node) {
            return Err(TwinError::Validation(format!(
                "no confirmed connection between {} and {}",
                req.source_node, req.dest_node
            )));
        }

        let profile = self.deps.catalog.load(&req.workload_file).await?;

        let number = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("vp-{:03}", number);
        let base = format!("virtual-pod-{:03}", number);
        let _id_guard = self.locks.lock(&id).await;

        let mut pod = VirtualPod {
            id: id.clone(),
            source_node: req.source_node.clone(),
            dest_node: req.dest_node.clone(),
            namespace: self.settings.namespace.clone(),
            source_pod_name: format!("{}-source", base),
            dest_pod_name: format!("{}-dest", base),
            kwok_node: self.settings.kwok_node.clone(),
            workload_file: req.workload_file.clone(),
            interval: req.interval,
            status: PodStatus::Creating,
            created_at: Utc::now(),
            replayer: None,
        };
        self.pods.insert(id.clone(), pod.clone());

        let handle = match self.provision(&pod, profile).await {
            Ok(handle) => handle,
            Err(e) => {
                self.pods.remove(&id);
                warn!(pod_id = %id, error = %e, "Virtual pod creation failed");
                return Err(e);
            }
        };

        pod.replayer = Some(handle);
        pod.status = PodStatus::Running;
        self.pods.insert(id.clone(), pod.clone());
        if let Err(e) = self.persist().await {
            warn!(pod_id = %id, error = %e, "Failed to persist registry, undoing creation");
            self.teardown(&pod).await;
            self.pods.remove(&id);
            return Err(e);
        }

        self.logger.log_virtual_pod_created(
            &id,
            &pod.source_node,
            &pod.dest_node,
            &pod.workload_file,
        );
        self.update_gauge();
        Ok(pod)
    }

    /// Place both synthetic pods and start the replayer, undoing earlier
    /// steps when a later one fails
    async fn provision(
        &self,
        pod: &VirtualPod,
        profile: WorkloadProfile,
    ) -> TwinResult<ReplayHandle> {
        let cluster = &self.deps.cluster;
        cluster.ensure_namespace(&pod.source_node, &pod.namespace).await?;
        cluster.ensure_namespace(&pod.dest_node, &pod.namespace).await?;

        let source = self.synthetic(pod, PodRole::Source);
        let dest = self.synthetic(pod, PodRole::Destination);

        cluster.apply_pod(&pod.source_node, &source).await?;
        if let Err(e) = cluster.apply_pod(&pod.dest_node, &dest).await {
            self.remove_synthetic(&pod.source_node, &pod.namespace, &pod.source_pod_name)
                .await;
            return Err(e);
        }

        let config = ReplayConfig {
            pod_name: pod.dest_pod_name.clone(),
            namespace: pod.namespace.clone(),
            source_node: pod.source_node.clone(),
            destination_node: pod.dest_node.clone(),
            time_series: profile.time_series,
        };

        match self
            .deps
            .replayer
            .start(&pod.dest_node, &pod.id, &config, pod.interval)
            .await
        {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.metrics.inc_replay_start_failures();
                self.remove_synthetic(&pod.source_node, &pod.namespace, &pod.source_pod_name)
                    .await;
                self.remove_synthetic(&pod.dest_node, &pod.namespace, &pod.dest_pod_name)
                    .await;
                Err(match e {
                    TwinError::Process(_) => e,
                    other => TwinError::Process(other.to_string()),
                })
            }
        }
    }

    fn synthetic(&self, pod: &VirtualPod, role: PodRole) -> SyntheticPod {
        let (name, peer_node, peer_pod) = match role {
            PodRole::Source => (&pod.source_pod_name, &pod.dest_node, &pod.dest_pod_name),
            PodRole::Destination => (&pod.dest_pod_name, &pod.source_node, &pod.source_pod_name),
        };
        SyntheticPod {
            name: name.clone(),
            namespace: pod.namespace.clone(),
            kwok_node: pod.kwok_node.clone(),
            role,
            virtual_pod_id: pod.id.clone(),
            peer_node: peer_node.clone(),
            peer_pod: peer_pod.clone(),
        }
    }

    async fn remove_synthetic(&self, node: &str, namespace: &str, name: &str) {
        if let Err(e) = self.deps.cluster.delete_pod(node, namespace, name).await {
            warn!(node = %node, pod = %name, error = %e, "Rollback of synthetic pod failed");
        }
    }

    /// Best-effort removal of everything a pod placed
    async fn teardown(&self, pod: &VirtualPod) {
        if let Some(handle) = &pod.replayer {
            if let Err(e) = self.deps.replayer.stop(handle).await {
                warn!(pod_id = %pod.id, error = %e, "Failed to stop replayer");
            }
        }
        self.remove_synthetic(&pod.source_node, &pod.namespace, &pod.source_pod_name)
            .await;
        self.remove_synthetic(&pod.dest_node, &pod.namespace, &pod.dest_pod_name)
            .await;
    }

    /// Delete a virtual pod: stop its replayer, remove both synthetic pods
    /// and drop the record.
    ///
    /// The record is removed even when a teardown step fails; such failures
    /// are reported as [`TwinError::PartialFailure`].
    pub async fn delete(&self, id: &str) -> TwinResult<VirtualPod> {
        let _id_guard = self.locks.lock(&id.to_string()).await;
        let mut pod = self
            .get(id)
            .ok_or_else(|| TwinError::NotFound(format!("virtual pod {}", id)))?;

        let mut completed = Vec::new();
        let mut failed = Vec::new();

        if let Some(handle) = &pod.replayer {
            match self.deps.replayer.stop(handle).await {
                Ok(()) => completed.push(format!("replayer {}", handle.pid)),
                Err(e) => failed.push(StepFailure {
                    target: format!("replayer {}", handle.pid),
                    reason: e.to_string(),
                }),
            }
        }

        for (node, name) in [
            (&pod.source_node, &pod.source_pod_name),
            (&pod.dest_node, &pod.dest_pod_name),
        ] {
            let target = format!("{}/{}/{}", node, pod.namespace, name);
            match self.deps.cluster.delete_pod(node, &pod.namespace, name).await {
                Ok(()) => completed.push(target),
                Err(e) => failed.push(StepFailure {
                    target,
                    reason: e.to_string(),
                }),
            }
        }

        self.pods.remove(id);
        self.persist().await?;
        self.update_gauge();
        self.logger.log_virtual_pod_deleted(id, failed.is_empty());

        if failed.is_empty() {
            pod.status = PodStatus::Deleted;
            Ok(pod)
        } else {
            Err(TwinError::PartialFailure {
                operation: format!("delete virtual pod {}", id),
                completed,
                failed,
            })
        }
    }

    async fn persist(&self) -> TwinResult<()> {
        self.file
            .save_snapshot(|| PodRegistry {
                virtual_pods: self
                    .list()
                    .into_iter()
                    .filter(|p| p.status == PodStatus::Running)
                    .collect(),
            })
            .await
    }

    fn update_gauge(&self) {
        let running = self
            .pods
            .iter()
            .filter(|p| p.status == PodStatus::Running)
            .count();
        self.metrics.set_virtual_pods_running(running);
    }
}
