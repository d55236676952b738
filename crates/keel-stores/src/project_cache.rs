//! Typed access to project task pointers

use std::sync::Arc;

use keel_core::config::CacheConfig;
use keel_core::models::{field_key, ProjectTaskPointer};
use keel_core::{KeelError, Result};

use crate::codec::{decode, encode, namespace_prefix};
use crate::traits::CacheStore;

/// Project collection of the cache
#[derive(Clone)]
pub struct ProjectCache {
    store: Arc<dyn CacheStore>,
    projects_key: String,
}

impl ProjectCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            projects_key: config.projects_key.clone(),
        }
    }

    pub fn projects_key(&self) -> &str {
        &self.projects_key
    }

    pub async fn get_project_task(&self, namespace: &str, name: &str) -> Result<ProjectTaskPointer> {
        let field = field_key(namespace, name);
        let raw = self
            .store
            .hget(&self.projects_key, &field)
            .await?
            .ok_or_else(|| KeelError::not_found(format!("project task {}", field)))?;
        decode(&self.projects_key, &field, &raw)
    }

    pub async fn get_project_tasks(&self, namespace: Option<&str>) -> Result<Vec<ProjectTaskPointer>> {
        self.store
            .hscan(&self.projects_key, &namespace_prefix(namespace))
            .await?
            .iter()
            .map(|(field, raw)| decode(&self.projects_key, field, raw))
            .collect()
    }

    pub async fn put_project_task(&self, pointer: &ProjectTaskPointer) -> Result<()> {
        self.store
            .hset(&self.projects_key, &pointer.key(), encode(pointer)?)
            .await
    }

    pub async fn delete_project_task(&self, namespace: &str, name: &str) -> Result<()> {
        self.store
            .hdel(&self.projects_key, &[field_key(namespace, name)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCacheStore;

    #[tokio::test]
    async fn test_project_task_lifecycle() {
        let cache = ProjectCache::new(Arc::new(MemoryCacheStore::new()), &CacheConfig::default());
        assert!(cache.get_project_task("ns", "demo").await.unwrap_err().is_not_found());

        cache
            .put_project_task(&ProjectTaskPointer::new("ns", "demo"))
            .await
            .unwrap();
        cache
            .put_project_task(&ProjectTaskPointer::new("other", "demo"))
            .await
            .unwrap();
        assert_eq!(cache.get_project_tasks(Some("ns")).await.unwrap().len(), 1);
        assert_eq!(cache.get_project_tasks(None).await.unwrap().len(), 2);

        cache.delete_project_task("ns", "demo").await.unwrap();
        assert!(cache.get_project_task("ns", "demo").await.is_err());
    }
}
