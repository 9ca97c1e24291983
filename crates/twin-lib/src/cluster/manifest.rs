//! Kubernetes manifests for synthetic (KWOK) placement

use k8s_openapi::api::core::v1::{
    Container, Namespace, Pod, PodSpec, ResourceRequirements, Toleration,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const KWOK_TOLERATION_KEY: &str = "kwok.x-k8s.io/node";
pub const PLACEHOLDER_IMAGE: &str = "fake-image:latest";

pub const LABEL_EMULATION_POD: &str = "emulation.k8s.io/pod";
pub const LABEL_VIRTUAL: &str = "emulation.liqo.k8s.io/virtual";

const ANN_VIRTUAL: &str = "emulation.liqo.k8s.io/is-virtual";
const ANN_ROLE: &str = "emulation.liqo.k8s.io/role";
const ANN_POD_ID: &str = "emulation.liqo.k8s.io/virtual-pod-id";
const ANN_METRICS_PREFIX: &str = "emulation.metrics.k8s.io";

/// Which end of a virtual pod a synthetic pod stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodRole {
    Source,
    Destination,
}

impl PodRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodRole::Source => "source",
            PodRole::Destination => "destination",
        }
    }
}

/// One synthetic pod of a virtual pod pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticPod {
    pub name: String,
    pub namespace: String,
    pub kwok_node: String,
    pub role: PodRole,
    pub virtual_pod_id: String,
    /// Node hosting the other end
    pub peer_node: String,
    /// Synthetic pod name of the other end
    pub peer_pod: String,
}

impl SyntheticPod {
    /// Annotations linking this pod to its peer, with zeroed replay metrics
    pub fn annotations(&self, timestamp: &str) -> BTreeMap<String, String> {
        let (peer_node_key, peer_pod_key) = match self.role {
            PodRole::Source => ("destination-node", "destination-pod"),
            PodRole::Destination => ("source-node", "source-pod"),
        };

        let mut annotations = BTreeMap::new();
        annotations.insert(ANN_VIRTUAL.to_string(), "true".to_string());
        annotations.insert(ANN_ROLE.to_string(), self.role.as_str().to_string());
        annotations.insert(
            format!("emulation.liqo.k8s.io/{}", peer_node_key),
            self.peer_node.clone(),
        );
        annotations.insert(
            format!("emulation.liqo.k8s.io/{}", peer_pod_key),
            self.peer_pod.clone(),
        );
        annotations.insert(ANN_POD_ID.to_string(), self.virtual_pod_id.clone());
        for (metric, zero) in [("cpu", "0m"), ("memory", "0Mi"), ("power", "0.0"), ("psi", "0.0")] {
            annotations.insert(format!("{}/{}", ANN_METRICS_PREFIX, metric), zero.to_string());
        }
        annotations.insert(
            format!("{}/timestamp", ANN_METRICS_PREFIX),
            timestamp.to_string(),
        );
        annotations
    }

    /// Pod pinned to the synthetic node, tolerating its taint
    pub fn to_pod(&self, timestamp: &str) -> Pod {
        let labels = BTreeMap::from([
            ("app".to_string(), self.name.clone()),
            (LABEL_EMULATION_POD.to_string(), "true".to_string()),
            (LABEL_VIRTUAL.to_string(), "true".to_string()),
        ]);

        let quantities = |cpu: &str, memory: &str| {
            BTreeMap::from([
                ("cpu".to_string(), Quantity(cpu.to_string())),
                ("memory".to_string(), Quantity(memory.to_string())),
            ])
        };

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                annotations: Some(self.annotations(timestamp)),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(self.kwok_node.clone()),
                tolerations: Some(vec![Toleration {
                    key: Some(KWOK_TOLERATION_KEY.to_string()),
                    operator: Some("Exists".to_string()),
                    effect: Some("NoSchedule".to_string()),
                    ..Default::default()
                }]),
                containers: vec![Container {
                    name: self.name.clone(),
                    image: Some(PLACEHOLDER_IMAGE.to_string()),
                    resources: Some(ResourceRequirements {
                        requests: Some(quantities("100m", "128Mi")),
                        limits: Some(quantities("1000m", "512Mi")),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}
