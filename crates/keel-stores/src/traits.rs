//! Cache store trait

use std::collections::BTreeMap;

use keel_core::Result;

/// Snapshot of collection versions taken by [`CacheStore::watch`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchToken {
    pub versions: BTreeMap<String, u64>,
}

/// One write queued in a transactional pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOp {
    HSet {
        key: String,
        field: String,
        value: String,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
}

impl PipelineOp {
    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn hdel(key: impl Into<String>, fields: Vec<String>) -> Self {
        Self::HDel {
            key: key.into(),
            fields,
        }
    }

    /// Collection this op writes to
    pub fn key(&self) -> &str {
        match self {
            Self::HSet { key, .. } | Self::HDel { key, .. } => key,
        }
    }
}

/// Hash-collection cache with optimistic transactions
///
/// `watch` records the current version of each collection; `exec` applies the
/// pipeline atomically, or fails with `CacheError::TxAborted` if any watched
/// collection was written in between.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hget_all(&self, key: &str) -> Result<BTreeMap<String, String>>;

    /// Fields starting with `prefix`
    async fn hscan(&self, key: &str, prefix: &str) -> Result<BTreeMap<String, String>>;

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()>;

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()>;

    async fn watch(&self, keys: &[&str]) -> Result<WatchToken>;

    async fn exec(&self, token: WatchToken, ops: Vec<PipelineOp>) -> Result<()>;
}
