//! Short-lived query cache bounded by window resolution

use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    stored_at: Instant,
    ttl: Duration,
    value: V,
}

/// Cache whose entries expire after a per-entry TTL
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value that is still within its TTL
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() < entry.ttl {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    /// Store a value, dropping whatever has already expired
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        self.purge_expired();
        self.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                ttl,
                value,
            },
        );
    }

    /// Drop all expired entries
    pub fn purge_expired(&self) {
        self.entries.retain(|_, e| e.stored_at.elapsed() < e.ttl);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = TtlCache::new();
        cache.insert("q", 1u32, Duration::from_millis(30));

        assert_eq!(cache.get(&"q"), Some(1));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get(&"q"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_fresh_entries() {
        let cache = TtlCache::new();
        cache.insert("old", 1u32, Duration::from_millis(10));
        cache.insert("fresh", 2u32, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.purge_expired();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"fresh"), Some(2));
    }

    #[tokio::test]
    async fn test_insert_evicts_expired_entries() {
        let cache = TtlCache::new();
        for i in 0..100u32 {
            cache.insert(i, i, Duration::from_millis(200));
        }
        assert_eq!(cache.len(), 100);

        tokio::time::sleep(Duration::from_millis(250)).await;
        cache.insert(1000, 0, Duration::from_secs(60));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1000), Some(0));
    }
}
