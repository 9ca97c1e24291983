//! Observability infrastructure for the testbed
//!
//! Provides:
//! - Prometheus metrics for the orchestrator itself (query latency, load
//!   sampling, connection and pod counts, replay failures)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge_vec, Histogram, IntCounter,
    IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for backend round trips (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static GLOBAL_METRICS: OnceLock<TwinMetricsInner> = OnceLock::new();

struct TwinMetricsInner {
    metrics_query_latency_seconds: Histogram,
    load_sample_latency_seconds: Histogram,
    load_sample_errors: IntCounter,
    connections: IntGaugeVec,
    virtual_pods_running: IntGaugeVec,
    replay_start_failures: IntCounter,
    cascade_aborts: IntCounter,
}

impl TwinMetricsInner {
    fn new() -> Self {
        Self {
            metrics_query_latency_seconds: register_histogram!(
                "twin_metrics_query_latency_seconds",
                "Time spent on range queries against the time-series backend",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register metrics_query_latency_seconds"),

            load_sample_latency_seconds: register_histogram!(
                "twin_load_sample_latency_seconds",
                "Time spent sampling instantaneous node load",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register load_sample_latency_seconds"),

            load_sample_errors: register_int_counter!(
                "twin_load_sample_errors_total",
                "Load samples that failed and kept the previous colors"
            )
            .expect("Failed to register load_sample_errors"),

            connections: register_int_gauge_vec!(
                "twin_connections",
                "Peering connections by state",
                &["state"]
            )
            .expect("Failed to register connections"),

            virtual_pods_running: register_int_gauge_vec!(
                "twin_virtual_pods",
                "Virtual pods currently registered",
                &["status"]
            )
            .expect("Failed to register virtual_pods"),

            replay_start_failures: register_int_counter!(
                "twin_replay_start_failures_total",
                "Replay processes that failed to start"
            )
            .expect("Failed to register replay_start_failures"),

            cascade_aborts: register_int_counter!(
                "twin_cascade_aborts_total",
                "Connection removals aborted because a dependent pod could not be deleted"
            )
            .expect("Failed to register cascade_aborts"),
        }
    }
}

/// Handle to the process-wide testbed metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct TwinMetrics {
    _private: (),
}

impl Default for TwinMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TwinMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TwinMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TwinMetricsInner {
        GLOBAL_METRICS.get_or_init(TwinMetricsInner::new)
    }

    pub fn observe_metrics_query_latency(&self, duration_secs: f64) {
        self.inner().metrics_query_latency_seconds.observe(duration_secs);
    }

    pub fn observe_load_sample_latency(&self, duration_secs: f64) {
        self.inner().load_sample_latency_seconds.observe(duration_secs);
    }

    pub fn inc_load_sample_errors(&self) {
        self.inner().load_sample_errors.inc();
    }

    /// Update connection counts
    pub fn set_connections(&self, confirmed: usize, pending: usize) {
        let gauge = &self.inner().connections;
        gauge.with_label_values(&["confirmed"]).set(confirmed as i64);
        gauge.with_label_values(&["pending"]).set(pending as i64);
    }

    pub fn set_virtual_pods_running(&self, count: usize) {
        self.inner()
            .virtual_pods_running
            .with_label_values(&["running"])
            .set(count as i64);
    }

    pub fn inc_replay_start_failures(&self) {
        self.inner().replay_start_failures.inc();
    }

    pub fn inc_cascade_aborts(&self) {
        self.inner().cascade_aborts.inc();
    }
}

/// Structured logger for testbed lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    testbed: String,
}

impl StructuredLogger {
    pub fn new(testbed: impl Into<String>) -> Self {
        Self {
            testbed: testbed.into(),
        }
    }

    pub fn log_startup(&self, version: &str, nodes: usize, k3s_nodes: usize) {
        info!(
            event = "testbed_started",
            testbed = %self.testbed,
            version = %version,
            nodes = nodes,
            k3s_nodes = k3s_nodes,
            "Digital twin orchestrator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "testbed_shutdown",
            testbed = %self.testbed,
            reason = %reason,
            "Digital twin orchestrator shutting down"
        );
    }

    pub fn log_connection_pending(&self, from: &str, to: &str, dwell_ms: u64) {
        info!(
            event = "connection_pending",
            testbed = %self.testbed,
            from = %from,
            to = %to,
            dwell_ms = dwell_ms,
            "Peering connection awaiting confirmation"
        );
    }

    pub fn log_connection_confirmed(&self, from: &str, to: &str) {
        info!(
            event = "connection_confirmed",
            testbed = %self.testbed,
            from = %from,
            to = %to,
            "Peering connection confirmed"
        );
    }

    /// Log a connection removal, with the pods deleted along with it
    pub fn log_connection_removed(&self, from: &str, to: &str, cascaded_pods: &[String]) {
        info!(
            event = "connection_removed",
            testbed = %self.testbed,
            from = %from,
            to = %to,
            cascaded_pods = ?cascaded_pods,
            "Peering connection removed"
        );
    }

    pub fn log_virtual_pod_created(&self, id: &str, source: &str, dest: &str, workload: &str) {
        info!(
            event = "virtual_pod_created",
            testbed = %self.testbed,
            pod_id = %id,
            source_node = %source,
            dest_node = %dest,
            workload = %workload,
            "Virtual pod created"
        );
    }

    /// Log a pod deletion; `clean` is false when some teardown step failed
    pub fn log_virtual_pod_deleted(&self, id: &str, clean: bool) {
        if clean {
            info!(
                event = "virtual_pod_deleted",
                testbed = %self.testbed,
                pod_id = %id,
                clean = true,
                "Virtual pod deleted"
            );
        } else {
            warn!(
                event = "virtual_pod_deleted",
                testbed = %self.testbed,
                pod_id = %id,
                clean = false,
                "Virtual pod deleted with incomplete teardown"
            );
        }
    }

    pub fn log_load_sampled(&self, nodes: usize, red: usize, amber: usize) {
        info!(
            event = "load_sampled",
            testbed = %self.testbed,
            nodes = nodes,
            red = red,
            amber = amber,
            "Sampled node load"
        );
    }
}
