//! Configuration types

use serde::{Deserialize, Serialize};

/// Main configuration for keel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task executor configuration
    pub tasks: TasksConfig,

    /// Release orchestrator configuration
    pub release: ReleaseConfigSection,

    /// Project orchestrator configuration
    pub project: ProjectConfigSection,

    /// Cache reconciler configuration
    pub sync: SyncConfig,

    /// Cache collection names
    pub cache: CacheConfig,

    /// Static chart catalog used for offline dependency planning
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartEntry>,
}

/// Task executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Maximum number of task handlers running at once
    pub worker_concurrency: usize,

    /// Queue the tasks are sent to
    pub default_queue: String,

    /// How long finished task state is retained
    pub results_expire_in_sec: u64,

    /// Poll interval used by synchronous callers waiting on a task
    pub poll_interval_sec: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 100,
            default_queue: "keel_tasks".to_string(),
            results_expire_in_sec: 3600,
            poll_interval_sec: 1,
        }
    }
}

/// Release orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfigSection {
    /// Timeout applied when a caller passes zero
    pub default_timeout_sec: i64,

    /// Retries performed by the `*_with_retry` operations on conflict
    pub retry_times: u32,

    /// Sleep between conflict retries
    pub retry_interval_sec: u64,
}

impl Default for ReleaseConfigSection {
    fn default() -> Self {
        Self {
            default_timeout_sec: 300,
            retry_times: 5,
            retry_interval_sec: 2,
        }
    }
}

/// Project orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfigSection {
    /// Timeout applied when a caller passes zero
    pub default_timeout_sec: i64,
}

impl Default for ProjectConfigSection {
    fn default() -> Self {
        Self {
            default_timeout_sec: 600,
        }
    }
}

/// Cache reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between resync cycles
    pub resync_interval_sec: u64,

    /// Backoff before retrying an aborted transaction
    pub tx_retry_delay_sec: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_interval_sec: 300,
            tx_retry_delay_sec: 5,
        }
    }
}

/// Names of the hash collections in the cache store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub releases_key: String,
    pub release_tasks_key: String,
    pub projects_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            releases_key: "keel-releases".to_string(),
            release_tasks_key: "keel-release-tasks".to_string(),
            projects_key: "keel-project-tasks".to_string(),
        }
    }
}

/// One chart in the static catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartEntry {
    pub name: String,
    pub version: String,
    pub repo: String,
    /// Sub-charts this chart can be wired to
    pub dependencies: Vec<String>,
}
