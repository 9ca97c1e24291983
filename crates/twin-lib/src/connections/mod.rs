//! Peering connections between k3s nodes
//!
//! A connection goes Pending when initiated and is confirmed automatically
//! after a dwell period, unless a newer initiation touching either endpoint
//! (or an explicit cancel) supersedes it. Only confirmed connections are
//! persisted. Removing a connection first deletes every virtual pod bound to
//! it; if any of those deletions fails the connection stays.

mod table;

pub use table::ConnectionTable;

use crate::error::{StepFailure, TwinError, TwinResult};
use crate::models::{Connection, ConnectionState, NodePair, VirtualPod};
use crate::observability::{StructuredLogger, TwinMetrics};
use crate::pods::PodLifecycleManager;
use crate::topology::TopologyStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default dwell before a pending connection is confirmed
pub const DEFAULT_CONFIRM_DWELL: Duration = Duration::from_secs(10);

/// A connection awaiting confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConnection {
    pub from: String,
    pub to: String,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub confirms_at: DateTime<Utc>,
}

struct PendingEntry {
    token: u64,
    info: PendingConnection,
    timer: JoinHandle<()>,
}

/// Outcome of a successful removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub connection: Connection,
    /// Ids of the virtual pods deleted along with the connection
    pub deleted_pods: Vec<String>,
}

struct Inner {
    topology: Arc<TopologyStore>,
    table: Arc<ConnectionTable>,
    pods: Arc<PodLifecycleManager>,
    pending: DashMap<NodePair, PendingEntry>,
    /// Held across cancel-then-insert so concurrent initiations sharing an
    /// endpoint leave exactly one survivor
    initiate_lock: std::sync::Mutex<()>,
    next_token: AtomicU64,
    dwell: Duration,
    logger: StructuredLogger,
    metrics: TwinMetrics,
}

/// Connection state machine: None → Pending → Confirmed → None
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    pub fn new(
        topology: Arc<TopologyStore>,
        table: Arc<ConnectionTable>,
        pods: Arc<PodLifecycleManager>,
        dwell: Duration,
        logger: StructuredLogger,
    ) -> Self {
        let registry = Self {
            inner: Arc::new(Inner {
                topology,
                table,
                pods,
                pending: DashMap::new(),
                initiate_lock: std::sync::Mutex::new(()),
                next_token: AtomicU64::new(1),
                dwell,
                logger,
                metrics: TwinMetrics::new(),
            }),
        };
        registry.update_gauge();
        registry
    }

    pub fn dwell(&self) -> Duration {
        self.inner.dwell
    }

    async fn validate(&self, from: &str, to: &str) -> TwinResult<()> {
        if from == to {
            return Err(TwinError::Validation(format!(
                "cannot connect {} to itself",
                from
            )));
        }
        self.inner.topology.require_k3s(from).await?;
        self.inner.topology.require_k3s(to).await
    }

    /// Start a pending connection. Any pending connection sharing an
    /// endpoint with this one is cancelled first.
    pub async fn initiate(&self, from: &str, to: &str) -> TwinResult<PendingConnection> {
        self.validate(from, to).await?;

        let pair = NodePair::new(from, to);
        let now = Utc::now();
        let info = PendingConnection {
            from: from.to_string(),
            to: to.to_string(),
            state: ConnectionState::Pending,
            created_at: now,
            confirms_at: now
                + chrono::Duration::from_std(self.inner.dwell).unwrap_or_else(|_| chrono::Duration::zero()),
        };
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);

        // The timer waits until its entry is registered, so a cancel can
        // always find and abort it.
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let registry = self.clone();
        let timer_pair = pair.clone();
        let timer = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(registry.inner.dwell).await;
            registry.promote(timer_pair, token).await;
        });

        {
            let _initiating = self
                .inner
                .initiate_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.cancel_touching(&pair);
            self.inner.pending.insert(
                pair,
                PendingEntry {
                    token,
                    info: info.clone(),
                    timer,
                },
            );
        }
        let _ = armed_tx.send(());

        self.inner
            .logger
            .log_connection_pending(from, to, self.inner.dwell.as_millis() as u64);
        self.update_gauge();
        Ok(info)
    }

    /// Dwell elapsed: confirm the pending connection if it is still current
    async fn promote(&self, pair: NodePair, token: u64) {
        let Some((_, entry)) = self.inner.pending.remove_if(&pair, |_, e| e.token == token) else {
            debug!(pair = %pair, "Pending connection superseded before confirmation");
            return;
        };

        let info = entry.info;
        if let Err(e) = self.confirm(&info.from, &info.to).await {
            warn!(from = %info.from, to = %info.to, error = %e, "Failed to confirm connection");
        }
        self.update_gauge();
    }

    /// Cancel pending connections sharing an endpoint with `pair`
    fn cancel_touching(&self, pair: &NodePair) {
        self.inner.pending.retain(|key, entry| {
            if key.touches(pair) {
                entry.timer.abort();
                debug!(pair = %key, "Cancelled pending connection");
                false
            } else {
                true
            }
        });
    }

    /// Cancel the pending connection between `from` and `to`
    pub fn cancel(&self, from: &str, to: &str) -> bool {
        let cancelled = match self.inner.pending.remove(&NodePair::new(from, to)) {
            Some((_, entry)) => {
                entry.timer.abort();
                true
            }
            None => false,
        };
        self.update_gauge();
        cancelled
    }

    /// Pending connections, oldest first
    pub fn pending(&self) -> Vec<PendingConnection> {
        let mut all: Vec<PendingConnection> = self
            .inner
            .pending
            .iter()
            .map(|e| e.value().info.clone())
            .collect();
        all.sort_by_key(|p| p.created_at);
        all
    }

    /// Confirm a connection immediately. Confirming an existing pair (in
    /// either orientation) returns the existing record unchanged.
    pub async fn confirm(&self, from: &str, to: &str) -> TwinResult<Connection> {
        self.validate(from, to).await?;

        let pair = NodePair::new(from, to);
        let _guard = self.inner.table.lock_pair(&pair).await;
        let conn = Connection {
            from: from.to_string(),
            to: to.to_string(),
            state: ConnectionState::Confirmed,
            created_at: Utc::now(),
        };

        let stored = match self.inner.table.insert(conn).await {
            Ok(conn) => {
                self.inner.logger.log_connection_confirmed(from, to);
                conn
            }
            Err(TwinError::Conflict(reason)) => {
                debug!(reason = %reason, "Connection already confirmed");
                self.inner.table.get(&pair).ok_or_else(|| {
                    TwinError::Storage(format!("connection {} vanished during confirm", pair))
                })?
            }
            Err(e) => return Err(e),
        };
        self.update_gauge();
        Ok(stored)
    }

    /// Order-independent check for a confirmed connection
    pub fn exists(&self, a: &str, b: &str) -> bool {
        self.inner.table.exists(a, b)
    }

    /// Nodes with a confirmed connection to `node`
    pub fn peers_of(&self, node: &str) -> Vec<String> {
        self.inner.table.peers_of(node)
    }

    pub fn list(&self) -> Vec<Connection> {
        self.inner.table.list()
    }

    /// Virtual pods that removing the `a`↔`b` connection would delete
    pub fn removal_plan(&self, a: &str, b: &str) -> Vec<VirtualPod> {
        self.inner.pods.pods_for_pair(&NodePair::new(a, b))
    }

    /// Remove a confirmed connection and every virtual pod bound to it.
    ///
    /// Pods are deleted first. If any deletion fails the connection is kept
    /// and a [`TwinError::PartialFailure`] lists what was and was not done.
    pub async fn remove(&self, from: &str, to: &str) -> TwinResult<RemovalReport> {
        let pair = NodePair::new(from, to);
        self.cancel(from, to);

        let _guard = self.inner.table.lock_pair(&pair).await;
        if self.inner.table.get(&pair).is_none() {
            return Err(TwinError::NotFound(format!("connection {}", pair)));
        }

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for pod in self.inner.pods.pods_for_pair(&pair) {
            match self.inner.pods.delete(&pod.id).await {
                Ok(_) | Err(TwinError::NotFound(_)) => completed.push(pod.id),
                Err(e) => failed.push(StepFailure {
                    target: pod.id,
                    reason: e.to_string(),
                }),
            }
        }

        if !failed.is_empty() {
            self.inner.metrics.inc_cascade_aborts();
            warn!(
                pair = %pair,
                deleted = completed.len(),
                failed = failed.len(),
                "Connection kept, dependent pod deletion failed"
            );
            return Err(TwinError::PartialFailure {
                operation: format!("remove connection {}", pair),
                completed,
                failed,
            });
        }

        let connection = self
            .inner
            .table
            .remove(&pair)
            .await?
            .ok_or_else(|| TwinError::NotFound(format!("connection {}", pair)))?;

        self.inner
            .logger
            .log_connection_removed(&connection.from, &connection.to, &completed);
        self.update_gauge();
        Ok(RemovalReport {
            connection,
            deleted_pods: completed,
        })
    }

    fn update_gauge(&self) {
        self.inner
            .metrics
            .set_connections(self.inner.table.len(), self.inner.pending.len());
    }
}
