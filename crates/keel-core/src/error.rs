//! Error types for keel

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using KeelError
pub type Result<T> = std::result::Result<T, KeelError>;

/// Main error type for keel operations
#[derive(Debug, Error)]
pub enum KeelError {
    /// Entity is absent (release, project, task pointer, task state)
    #[error("{0} is not found")]
    NotFound(String),

    /// An active task already holds the identity
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Request rejected before any work was dispatched
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Chart engine, cluster operator, or other collaborator failure
    #[error("{component} failed to {operation}: {message}")]
    Upstream {
        component: &'static str,
        operation: String,
        message: String,
    },

    /// Task executor errors
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Cache store errors
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation not supported by the target release or chart
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// One or more pods could not be restarted
    #[error("failed to restart pods : [{}]", pods.join(", "))]
    RestartFailed { pods: Vec<String> },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl KeelError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Create a not-found error for the given entity description
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// Wrap a collaborator failure with the operation that was attempted
    pub fn upstream(
        component: &'static str,
        operation: impl Into<String>,
        err: impl fmt::Display,
    ) -> Self {
        Self::Upstream {
            component,
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error reports an absent entity
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the error is a release task conflict that a retry may resolve
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, Self::Conflict(c) if c.retryable())
    }

    /// Whether the error is an aborted optimistic transaction
    pub fn is_tx_aborted(&self) -> bool {
        matches!(self, Self::Cache(CacheError::TxAborted))
    }
}

/// Granularity at which a task pointer serializes mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskScope {
    Release,
    Project,
}

impl fmt::Display for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// An active task holds the (namespace, name) identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ConflictError {
    /// Which pointer collection raised the conflict
    pub scope: TaskScope,
    /// `namespace/name` of the guarded identity
    pub key: String,
    /// Name of the still-active task
    pub task_name: String,
    /// UUID of the still-active task
    pub task_uuid: String,
}

impl ConflictError {
    /// Only release-level conflicts are retried by the `*_with_retry` wrappers
    pub fn retryable(&self) -> bool {
        self.scope == TaskScope::Release
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            TaskScope::Release => write!(
                f,
                "please wait for the release latest task {}-{} finished or timeout",
                self.task_name, self.task_uuid
            ),
            TaskScope::Project => write!(
                f,
                "please wait for the last project task {}-{} finished or timeout",
                self.task_name, self.task_uuid
            ),
        }
    }
}

/// Request validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("release name can not be empty")]
    MissingName,

    #[error("at least one of chart name or chart image or chart files should be supported")]
    MissingChartSource,

    #[error("project releases can not be empty")]
    EmptyProject,

    /// The dependency graph contains a cycle
    #[error("cyclic dependency detected among releases: {0}")]
    CyclicDependency(String),

    #[error("more than one plugin {0} is not allowed")]
    DuplicatePlugin(String),

    #[error("release {release} is not found in project {project}")]
    ReleaseNotInProject { release: String, project: String },

    #[error("invalid label selector: {0}")]
    InvalidLabelSelector(String),
}

/// Task executor errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task {0} is not registered")]
    NotRegistered(String),

    #[error("task {0} is already registered")]
    AlreadyRegistered(String),

    /// Backend refused to accept a task
    #[error("task backend rejected {task}: {reason}")]
    Rejected { task: String, reason: String },

    #[error("task {task} failed: {message}")]
    Failed { task: String, message: String },

    #[error("task {task} did not finish within {timeout_sec}s")]
    Timeout { task: String, timeout_sec: i64 },
}

/// Cache store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A watched collection changed before the pipeline executed
    #[error("transaction aborted: watched collection modified concurrently")]
    TxAborted,

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("corrupt cache value {collection}[{field}]: {message}")]
    Corrupt {
        collection: String,
        field: String,
        message: String,
    },
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(scope: TaskScope) -> KeelError {
        ConflictError {
            scope,
            key: "ns/nm".to_string(),
            task_name: "Create-Release-Task".to_string(),
            task_uuid: "abc".to_string(),
        }
        .into()
    }

    #[test]
    fn test_release_conflict_message_is_stable() {
        let err = conflict(TaskScope::Release);
        assert_eq!(
            err.to_string(),
            "please wait for the release latest task Create-Release-Task-abc finished or timeout"
        );
        assert!(err.is_retryable_conflict());
    }

    #[test]
    fn test_project_conflict_not_retryable() {
        let err = conflict(TaskScope::Project);
        assert!(err.to_string().starts_with("please wait for the last project task"));
        assert!(!err.is_retryable_conflict());
    }

    #[test]
    fn test_retry_is_structural() {
        let err = KeelError::other("please wait for the release latest task x-y finished or timeout");
        assert!(!err.is_retryable_conflict());
    }

    #[test]
    fn test_predicates() {
        assert!(KeelError::not_found("release ns/a").is_not_found());
        assert!(KeelError::from(CacheError::TxAborted).is_tx_aborted());
        assert!(!KeelError::other("x").is_not_found());
    }

    #[test]
    fn test_restart_failed_lists_every_pod() {
        let err = KeelError::RestartFailed {
            pods: vec!["ns/a".to_string(), "ns/b".to_string()],
        };
        assert_eq!(err.to_string(), "failed to restart pods : [ns/a, ns/b]");
    }
}
