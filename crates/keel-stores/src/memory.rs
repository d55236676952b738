//! In-process cache store

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use keel_core::{CacheError, Result};
use tracing::debug;

use crate::traits::{CacheStore, PipelineOp, WatchToken};

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, BTreeMap<String, String>>,
    versions: HashMap<String, u64>,
    forced_aborts: u32,
}

impl Inner {
    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_default() += 1;
    }

    fn apply(&mut self, op: PipelineOp) {
        match op {
            PipelineOp::HSet { key, field, value } => {
                self.bump(&key);
                self.hashes.entry(key).or_default().insert(field, value);
            }
            PipelineOp::HDel { key, fields } => {
                self.bump(&key);
                if let Some(hash) = self.hashes.get_mut(&key) {
                    for field in &fields {
                        hash.remove(field);
                    }
                }
            }
        }
    }
}

/// Cache store kept in memory; every write bumps its collection's version
#[derive(Default)]
pub struct MemoryCacheStore {
    inner: Mutex<Inner>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `count` transactions abort as if a concurrent write happened
    pub fn force_tx_aborts(&self, count: u32) {
        self.lock().forced_aborts = count;
    }

    /// Number of fields in a collection
    pub fn len(&self, key: &str) -> usize {
        self.lock().hashes.get(key).map_or(0, BTreeMap::len)
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    async fn hget_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hscan(&self, key: &str, prefix: &str) -> Result<BTreeMap<String, String>> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .filter(|(field, _)| field.starts_with(prefix))
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.lock()
            .apply(PipelineOp::hset(key, field, value));
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.lock().apply(PipelineOp::hdel(key, fields.to_vec()));
        Ok(())
    }

    async fn watch(&self, keys: &[&str]) -> Result<WatchToken> {
        let inner = self.lock();
        let versions = keys
            .iter()
            .map(|k| (k.to_string(), inner.versions.get(*k).copied().unwrap_or(0)))
            .collect();
        Ok(WatchToken { versions })
    }

    async fn exec(&self, token: WatchToken, ops: Vec<PipelineOp>) -> Result<()> {
        let mut inner = self.lock();
        if inner.forced_aborts > 0 {
            inner.forced_aborts -= 1;
            return Err(CacheError::TxAborted.into());
        }
        let changed = token
            .versions
            .iter()
            .any(|(key, version)| inner.versions.get(key).copied().unwrap_or(0) != *version);
        if changed {
            return Err(CacheError::TxAborted.into());
        }
        debug!(ops = ops.len(), "applying cache pipeline");
        for op in ops {
            inner.apply(op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryCacheStore::new();
        store.hset("h", "ns/a", "1".to_string()).await.unwrap();
        store.hset("h", "ns/b", "2".to_string()).await.unwrap();
        store.hset("h", "other/c", "3".to_string()).await.unwrap();

        assert_eq!(store.hget("h", "ns/a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.hscan("h", "ns/").await.unwrap().len(), 2);

        store.hdel("h", &["ns/a".to_string()]).await.unwrap();
        assert!(store.hget("h", "ns/a").await.unwrap().is_none());
        assert_eq!(store.hget_all("h").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exec_aborts_on_concurrent_write() {
        let store = MemoryCacheStore::new();
        let token = store.watch(&["h"]).await.unwrap();
        store.hset("h", "x", "1".to_string()).await.unwrap();

        let err = store
            .exec(token, vec![PipelineOp::hset("h", "y", "2")])
            .await
            .unwrap_err();
        assert!(err.is_tx_aborted());
        assert!(store.hget("h", "y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exec_applies_all_ops() {
        let store = MemoryCacheStore::new();
        store.hset("a", "old", "1".to_string()).await.unwrap();
        let token = store.watch(&["a", "b"]).await.unwrap();
        store
            .exec(
                token,
                vec![
                    PipelineOp::hdel("a", vec!["old".to_string()]),
                    PipelineOp::hset("b", "new", "2"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.len("a"), 0);
        assert_eq!(store.len("b"), 1);
    }

    #[tokio::test]
    async fn test_forced_abort() {
        let store = MemoryCacheStore::new();
        store.force_tx_aborts(1);
        let token = store.watch(&["a"]).await.unwrap();
        assert!(store.exec(token.clone(), Vec::new()).await.is_err());
        assert!(store.exec(token, Vec::new()).await.is_ok());
    }
}
