//! Persisted set of confirmed connections

use crate::error::{TwinError, TwinResult};
use crate::models::{Connection, ConnectionState, NodePair};
use crate::store::{JsonFile, KeyGuard, KeyedLocks};
use dashmap::DashMap;
use tracing::{debug, warn};

/// Confirmed connections keyed by unordered pair.
///
/// Mutations require the pair lock from [`ConnectionTable::lock_pair`];
/// reads never take it.
pub struct ConnectionTable {
    records: DashMap<NodePair, Connection>,
    locks: KeyedLocks<NodePair>,
    file: JsonFile<Vec<Connection>>,
}

impl ConnectionTable {
    /// Open the table, loading previously confirmed connections.
    /// Duplicate pairs in the file collapse to the oldest record.
    pub async fn open(file: JsonFile<Vec<Connection>>) -> TwinResult<Self> {
        let records = DashMap::new();
        let mut stored = file.load().await?;
        stored.sort_by_key(|c| c.created_at);

        for mut conn in stored {
            if conn.from == conn.to {
                warn!(node = %conn.from, "Dropping self-connection from storage");
                continue;
            }
            conn.state = ConnectionState::Confirmed;
            records.entry(conn.pair()).or_insert(conn);
        }
        debug!(path = %file.path().display(), connections = records.len(), "Loaded connections");

        Ok(Self {
            records,
            locks: KeyedLocks::new(),
            file,
        })
    }

    /// Exclusive write access to one pair
    pub async fn lock_pair(&self, pair: &NodePair) -> KeyGuard<NodePair> {
        self.locks.lock(pair).await
    }

    pub fn get(&self, pair: &NodePair) -> Option<Connection> {
        self.records.get(pair).map(|c| c.clone())
    }

    /// Order-independent existence check
    pub fn exists(&self, a: &str, b: &str) -> bool {
        self.records.contains_key(&NodePair::new(a, b))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All connections, oldest first
    pub fn list(&self) -> Vec<Connection> {
        let mut all: Vec<Connection> = self.records.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.pair().cmp(&b.pair()))
        });
        all
    }

    /// Every node with a connection to `node`, sorted
    pub fn peers_of(&self, node: &str) -> Vec<String> {
        let mut peers: Vec<String> = self
            .records
            .iter()
            .filter_map(|e| e.key().peer_of(node).map(str::to_string))
            .collect();
        peers.sort();
        peers
    }

    /// Insert `conn`. Fails with [`TwinError::Conflict`] when the pair
    /// already exists in either orientation. Caller holds the pair lock.
    pub(crate) async fn insert(&self, conn: Connection) -> TwinResult<Connection> {
        let pair = conn.pair();
        if self.records.contains_key(&pair) {
            return Err(TwinError::Conflict(format!("connection {} already exists", pair)));
        }

        self.records.insert(pair.clone(), conn.clone());
        if let Err(e) = self.persist().await {
            self.records.remove(&pair);
            return Err(e);
        }
        Ok(conn)
    }

    /// Remove the connection for `pair`. Caller holds the pair lock.
    pub(crate) async fn remove(&self, pair: &NodePair) -> TwinResult<Option<Connection>> {
        let Some((_, removed)) = self.records.remove(pair) else {
            return Ok(None);
        };
        if let Err(e) = self.persist().await {
            self.records.insert(pair.clone(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    async fn persist(&self) -> TwinResult<()> {
        self.file.save_snapshot(|| self.list()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn conn(from: &str, to: &str) -> Connection {
        Connection {
            from: from.to_string(),
            to: to.to_string(),
            state: ConnectionState::Confirmed,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_conflicts_across_orientations() {
        let dir = tempfile::tempdir().unwrap();
        let table = ConnectionTable::open(JsonFile::new(dir.path().join("c.json")))
            .await
            .unwrap();

        table.insert(conn("serf1", "serf2")).await.unwrap();
        let err = table.insert(conn("serf2", "serf1")).await.unwrap_err();
        assert!(matches!(err, TwinError::Conflict(_)));
        assert_eq!(table.get(&NodePair::new("serf1", "serf2")).unwrap().from, "serf1");
        assert_eq!(table.len(), 1);
        assert!(table.exists("serf2", "serf1"));
    }

    #[tokio::test]
    async fn test_reopen_restores_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liqo_connections.json");
        std::fs::write(
            &path,
            r#"[
              {"from":"serf1","to":"serf2","state":"confirmed","created_at":"2026-01-01T00:00:00Z"},
              {"from":"serf2","to":"serf1","state":"confirmed","created_at":"2026-01-02T00:00:00Z"},
              {"from":"serf3","to":"serf3","state":"confirmed","created_at":"2026-01-03T00:00:00Z"},
              {"from":"serf3","to":"serf4","state":"pending","created_at":"2026-01-04T00:00:00Z"}
            ]"#,
        )
        .unwrap();

        let table = ConnectionTable::open(JsonFile::new(&path)).await.unwrap();
        let all = table.list();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].from, "serf1");
        assert!(all.iter().all(|c| c.state == ConnectionState::Confirmed));
        assert_eq!(table.peers_of("serf3"), vec!["serf4".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let table = ConnectionTable::open(JsonFile::new(&path)).await.unwrap();
        table.insert(conn("serf1", "serf2")).await.unwrap();

        let removed = table.remove(&NodePair::new("serf2", "serf1")).await.unwrap();
        assert!(removed.is_some());
        assert!(table.remove(&NodePair::new("serf1", "serf2")).await.unwrap().is_none());

        let reopened = ConnectionTable::open(JsonFile::new(&path)).await.unwrap();
        assert!(reopened.is_empty());
    }
}
