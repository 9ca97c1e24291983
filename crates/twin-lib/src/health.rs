//! Component health for the orchestrator
//!
//! Tracks the topology source, load sampling and the time-series backend,
//! and derives liveness and readiness from them.

use crate::error::TwinResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Latest observation of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            status,
            message,
            since: now,
            checked_at: now,
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components; healthy when there are none
    pub fn overall<'a>(components: impl IntoIterator<Item = &'a ComponentHealth>) -> ComponentStatus {
        components
            .into_iter()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const TOPOLOGY: &str = "topology";
    pub const LOAD_MONITOR: &str = "load_monitor";
    pub const METRICS_BACKEND: &str = "metrics_backend";

    pub const ALL: &[&str] = &[TOPOLOGY, LOAD_MONITOR, METRICS_BACKEND];

    /// Components whose failure makes the orchestrator not ready
    pub const CRITICAL: &[&str] = &[TOPOLOGY];
}

/// Health registry shared by the background loops and the HTTP probes
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register components as healthy
    pub async fn register(&self, names: &[&str]) {
        let mut components = self.components.write().await;
        for name in names {
            components.insert(
                name.to_string(),
                ComponentHealth::new(ComponentStatus::Healthy, None),
            );
        }
    }

    /// Record an observation; `since` only moves when the status changes
    async fn update(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut components = self.components.write().await;
        match components.get_mut(name) {
            Some(current) if current.status == status => {
                current.message = message;
                current.checked_at = Utc::now();
            }
            _ => {
                components.insert(name.to_string(), ComponentHealth::new(status, message));
            }
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Healthy on `Ok`, degraded with the error message on `Err`
    pub async fn record<T>(&self, name: &str, result: &TwinResult<T>) {
        match result {
            Ok(_) => self.set_healthy(name).await,
            Err(e) => self.set_degraded(name, e.to_string()).await,
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        HealthResponse {
            status: HealthResponse::overall(components.values()),
            components,
        }
    }

    /// Ready once the topology has loaded and no critical component failed
    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Topology not yet loaded".to_string()),
            };
        }

        let components = self.components.read().await;
        let failed = components::CRITICAL.iter().find(|name| {
            components
                .get(**name)
                .is_some_and(|c| c.status == ComponentStatus::Unhealthy)
        });

        match failed {
            Some(name) => ReadinessResponse {
                ready: false,
                reason: Some(format!("Critical component unhealthy: {}", name)),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
