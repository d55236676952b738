//! keel core - shared foundation of the keel release control plane
//!
//! This crate provides the error taxonomy, configuration, data model, value
//! merging, and the collaborator traits (chart engine, cluster operator) that
//! the task, release, project, and sync crates build on.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod values;

pub use cluster::ClusterOperator;
pub use engine::{ChartCatalog, ChartEngine, ChartMetadata, InstallOptions, SubChartLookup};
pub use error::{
    CacheError, ConfigError, ConflictError, KeelError, Result, TaskError, TaskScope,
    ValidationError,
};
pub use values::{merge_values, reuse_release_request};
