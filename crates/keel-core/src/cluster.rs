//! Cluster operator collaborator

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LabelSelector, ReleaseConfig, ResourceMeta, ResourceSet, Values};

/// Low-level cluster operations the orchestrators depend on
#[async_trait]
pub trait ClusterOperator: Send + Sync {
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Aggregate the live status of the given resources
    async fn resource_set(&self, metas: &[ResourceMeta]) -> Result<ResourceSet>;

    /// Materialize a rendered manifest into one object per document
    async fn build_manifest_objects(&self, namespace: &str, manifest: &str) -> Result<Vec<Values>>;

    /// Delete the persistent volume claims owned by the given stateful sets
    async fn delete_stateful_set_pvcs(&self, stateful_sets: &[ResourceMeta]) -> Result<()>;

    /// Release configs matching `selector`; `None` searches every namespace
    async fn list_release_configs(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<ReleaseConfig>>;
}
