//! Data model shared by the orchestrators, the cache, and the reconciler

pub mod cluster;
pub mod project;
pub mod release;
pub mod task;

pub use cluster::{
    LabelSelector, Pod, ReleaseConfig, Resource, ResourceKind, ResourceMeta, ResourceSet,
    ResourceState,
};
pub use project::{ProjectInfo, ProjectParams, EMPTY_PROJECT_MESSAGE, PROJECT_NAME_LABEL};
pub use release::{
    ChartFile, ReleaseInfo, ReleasePlugin, ReleaseRecord, ReleaseRequest, ReleaseSpec, Values,
    PAUSED_MESSAGE, PAUSE_RELEASE_PLUGIN,
};
pub use task::{ProjectTaskPointer, ReleaseTaskPointer, TaskPointer, TaskSignature};

/// Cache field name for a namespaced identity
pub fn field_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Split a cache field name back into `(namespace, name)`
pub fn split_field_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}
