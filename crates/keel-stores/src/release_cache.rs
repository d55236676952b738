//! Typed access to release records and release task pointers

use std::sync::Arc;

use keel_core::config::CacheConfig;
use keel_core::models::{field_key, ReleaseRecord, ReleaseTaskPointer};
use keel_core::{KeelError, Result};
use tracing::debug;

use crate::codec::{decode, encode, namespace_prefix};
use crate::traits::CacheStore;

/// Release collections of the cache
#[derive(Clone)]
pub struct ReleaseCache {
    store: Arc<dyn CacheStore>,
    releases_key: String,
    release_tasks_key: String,
}

impl ReleaseCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            releases_key: config.releases_key.clone(),
            release_tasks_key: config.release_tasks_key.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn releases_key(&self) -> &str {
        &self.releases_key
    }

    pub fn release_tasks_key(&self) -> &str {
        &self.release_tasks_key
    }

    pub async fn get_release_record(&self, namespace: &str, name: &str) -> Result<ReleaseRecord> {
        let field = field_key(namespace, name);
        let raw = self
            .store
            .hget(&self.releases_key, &field)
            .await?
            .ok_or_else(|| KeelError::not_found(format!("release cache {}", field)))?;
        decode(&self.releases_key, &field, &raw)
    }

    /// Cached records of one namespace, or of every namespace
    pub async fn get_release_records(&self, namespace: Option<&str>) -> Result<Vec<ReleaseRecord>> {
        let fields = self
            .store
            .hscan(&self.releases_key, &namespace_prefix(namespace))
            .await?;
        fields
            .iter()
            .map(|(field, raw)| decode(&self.releases_key, field, raw))
            .collect()
    }

    pub async fn put_release_record(&self, record: &ReleaseRecord) -> Result<()> {
        let field = record.key();
        debug!(release = %field, version = record.spec.version, "caching release record");
        self.store
            .hset(&self.releases_key, &field, encode(record)?)
            .await
    }

    pub async fn delete_release_record(&self, namespace: &str, name: &str) -> Result<()> {
        self.store
            .hdel(&self.releases_key, &[field_key(namespace, name)])
            .await
    }

    pub async fn get_release_task(&self, namespace: &str, name: &str) -> Result<ReleaseTaskPointer> {
        let field = field_key(namespace, name);
        let raw = self
            .store
            .hget(&self.release_tasks_key, &field)
            .await?
            .ok_or_else(|| KeelError::not_found(format!("release task {}", field)))?;
        decode(&self.release_tasks_key, &field, &raw)
    }

    pub async fn get_release_tasks(&self, namespace: Option<&str>) -> Result<Vec<ReleaseTaskPointer>> {
        let fields = self
            .store
            .hscan(&self.release_tasks_key, &namespace_prefix(namespace))
            .await?;
        fields
            .iter()
            .map(|(field, raw)| decode(&self.release_tasks_key, field, raw))
            .collect()
    }

    pub async fn put_release_task(&self, pointer: &ReleaseTaskPointer) -> Result<()> {
        self.store
            .hset(&self.release_tasks_key, &pointer.key(), encode(pointer)?)
            .await
    }

    pub async fn delete_release_task(&self, namespace: &str, name: &str) -> Result<()> {
        self.store
            .hdel(&self.release_tasks_key, &[field_key(namespace, name)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCacheStore;
    use keel_core::models::TaskSignature;

    fn cache() -> (Arc<MemoryCacheStore>, ReleaseCache) {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ReleaseCache::new(store.clone(), &CacheConfig::default());
        (store, cache)
    }

    fn record(namespace: &str, name: &str) -> ReleaseRecord {
        let mut record = ReleaseRecord::default();
        record.spec.namespace = namespace.to_string();
        record.spec.name = name.to_string();
        record.spec.chart_name = "nginx".to_string();
        record
    }

    #[tokio::test]
    async fn test_release_record_lifecycle() {
        let (_, cache) = cache();
        let err = cache.get_release_record("ns", "web").await.unwrap_err();
        assert!(err.is_not_found());

        cache.put_release_record(&record("ns", "web")).await.unwrap();
        cache.put_release_record(&record("other", "db")).await.unwrap();
        assert_eq!(cache.get_release_record("ns", "web").await.unwrap().spec.chart_name, "nginx");
        assert_eq!(cache.get_release_records(Some("ns")).await.unwrap().len(), 1);
        assert_eq!(cache.get_release_records(None).await.unwrap().len(), 2);

        cache.delete_release_record("ns", "web").await.unwrap();
        assert!(cache.get_release_record("ns", "web").await.is_err());
    }

    #[tokio::test]
    async fn test_release_task_pointer_lifecycle() {
        let (_, cache) = cache();
        let pointer = ReleaseTaskPointer::new("ns", "web").with_signature(TaskSignature {
            name: "Create-Release-Task".to_string(),
            uuid: "u1".to_string(),
            ..Default::default()
        });
        cache.put_release_task(&pointer).await.unwrap();
        assert_eq!(cache.get_release_task("ns", "web").await.unwrap(), pointer);

        cache.delete_release_task("ns", "web").await.unwrap();
        assert!(cache.get_release_task("ns", "web").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_reported() {
        let (store, cache) = cache();
        store
            .hset(&CacheConfig::default().releases_key, "ns/web", "not json".to_string())
            .await
            .unwrap();
        let err = cache.get_release_record("ns", "web").await.unwrap_err();
        assert!(err.to_string().contains("corrupt cache value"));
    }
}
