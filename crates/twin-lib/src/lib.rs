//! Orchestration core for the digital-twin testbed
//!
//! This crate provides:
//! - The topology graph with deterministic layout and status coloring
//! - Peering connections with a pending → confirmed state machine
//! - Virtual pod lifecycle bound to connections and replay processes
//! - Windowed node/pod time series and periodic load sampling
//! - Container inventory and host resource usage
//! - Health checks and observability

pub mod cluster;
pub mod connections;
pub mod error;
pub mod health;
pub mod host;
pub mod interaction;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod pods;
pub mod store;
pub mod testbed;
pub mod timers;
pub mod topology;
pub mod workload;

#[cfg(test)]
mod testing;

pub use connections::{ConnectionRegistry, PendingConnection, RemovalReport};
pub use error::{StepFailure, TwinError, TwinResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use metrics::{MetricsGateway, Window};
pub use models::*;
pub use monitor::LoadMonitor;
pub use observability::{StructuredLogger, TwinMetrics};
pub use pods::PodLifecycleManager;
pub use testbed::{Testbed, TestbedBuilder};
pub use topology::TopologyStore;
