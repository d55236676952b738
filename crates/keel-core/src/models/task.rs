//! Task signatures and task pointers

use serde::{Deserialize, Serialize};

/// Opaque handle to one asynchronous unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature {
    /// Task kind name as registered with the backend
    pub name: String,
    /// Backend-assigned identifier
    pub uuid: String,
    /// Serialized task arguments
    pub arg: String,
    /// Client-side timeout used for `is_timeout` and blocking waits
    pub timeout_sec: i64,
}

impl TaskSignature {
    /// A signature without a UUID refers to no backend state
    pub fn is_empty(&self) -> bool {
        self.uuid.is_empty()
    }

    /// `name-uuid`, the form used in log lines and user-facing messages
    pub fn label(&self) -> String {
        format!("{}-{}", self.name, self.uuid)
    }
}

/// Maps a release or project identity to its most recent task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPointer {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub latest_task_signature: Option<TaskSignature>,
}

/// Pointer from a release identity to its latest task
pub type ReleaseTaskPointer = TaskPointer;

/// Pointer from a project identity to its latest task
pub type ProjectTaskPointer = TaskPointer;

impl TaskPointer {
    /// Create a pointer with no task attached
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            latest_task_signature: None,
        }
    }

    /// Attach the latest task signature
    pub fn with_signature(mut self, signature: TaskSignature) -> Self {
        self.latest_task_signature = Some(signature);
        self
    }

    /// Cache field key
    pub fn key(&self) -> String {
        super::field_key(&self.namespace, &self.name)
    }
}
