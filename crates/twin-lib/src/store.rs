//! File-backed JSON documents and per-key write locks

use crate::error::{TwinError, TwinResult};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::hash::Hash;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// A single JSON document on disk.
///
/// Writes are serialized and atomic (temp file + rename), so a reader never
/// observes a half-written document.
pub struct JsonFile<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file yields the default value
    pub async fn load(&self) -> TwinResult<T> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                TwinError::Storage(format!("corrupt {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(TwinError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub async fn save(&self, doc: &T) -> TwinResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write(doc).await
    }

    /// Build the document with `snapshot` under the write lock; the last
    /// writer always persists the newest state.
    pub async fn save_snapshot<F>(&self, snapshot: F) -> TwinResult<()>
    where
        F: FnOnce() -> T,
    {
        let _guard = self.write_lock.lock().await;
        self.write(&snapshot()).await
    }

    async fn write(&self, doc: &T) -> TwinResult<()> {
        let json = serde_json::to_vec_pretty(doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = json.len(), "Persisted document");
        Ok(())
    }
}

/// Per-key async mutexes; holders of the same key are serialized, different
/// keys proceed independently. An entry lives only while someone holds or
/// waits on it.
pub struct KeyedLocks<K> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            locks: self.locks.clone(),
            key: key.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock on one key; releasing the last reference removes the entry
pub struct KeyGuard<K>
where
    K: Eq + Hash,
{
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so the count is 1 only when idle
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_json_file_missing_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let file: JsonFile<Vec<String>> = JsonFile::new(dir.path().join("absent.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_file_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let file: JsonFile<Vec<String>> = JsonFile::new(&path);

        file.save(&vec!["serf1".to_string()]).await.unwrap();

        let reopened: JsonFile<Vec<String>> = JsonFile::new(&path);
        assert_eq!(reopened.load().await.unwrap(), vec!["serf1".to_string()]);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let file: JsonFile<Vec<String>> = JsonFile::new(&path);
        assert!(matches!(file.load().await, Err(TwinError::Storage(_))));
    }

    #[tokio::test]
    async fn test_keyed_locks_serialize_same_key() {
        let locks = Arc::new(KeyedLocks::<String>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&"serf1<->serf2".to_string()).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_keyed_locks_release_entries_after_use() {
        let locks = KeyedLocks::<String>::new();
        for i in 0..1000 {
            let _guard = locks.lock(&format!("vp-missing-{}", i)).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_keyed_locks_entry_survives_while_waiter_queued() {
        let locks = Arc::new(KeyedLocks::<String>::new());
        let key = "serf1<->serf2".to_string();
        let first = locks.lock(&key).await;

        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_keyed_locks_different_keys_independent() {
        let locks = KeyedLocks::<String>::new();
        let _a = locks.lock(&"a".to_string()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&"b".to_string())).await;
        assert!(b.is_ok());
    }
}
