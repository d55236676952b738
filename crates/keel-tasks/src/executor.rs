//! Task executor: send, query, wait on, and purge tasks by signature

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keel_core::config::TasksConfig;
use keel_core::models::TaskSignature;
use keel_core::{KeelError, Result, TaskError};
use tracing::{debug, error, warn};

use crate::backend::{TaskBackend, TaskHandler, TaskRecord, TaskStatus};
use crate::kind::TaskKind;
use crate::local::LocalTaskBackend;

/// Point-in-time view of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub name: String,
    pub uuid: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    error_msg: String,
    timed_out: bool,
}

impl TaskState {
    /// Evaluate a backend record against the signature's timeout at `now`
    pub fn new(record: TaskRecord, timeout_sec: i64, now: DateTime<Utc>) -> Self {
        let timed_out = (now - record.created_at).num_milliseconds() > timeout_sec.saturating_mul(1000);
        Self {
            name: record.name,
            uuid: record.uuid,
            status: record.status,
            created_at: record.created_at,
            error_msg: record.error.unwrap_or_default(),
            timed_out,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    /// Older than the signature's timeout, regardless of backend status
    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }

    pub fn error_msg(&self) -> &str {
        &self.error_msg
    }
}

/// Front door to the task backend
pub struct TaskExecutor {
    backend: Arc<dyn TaskBackend>,
    poll_interval: Duration,
}

impl TaskExecutor {
    pub fn new(backend: Arc<dyn TaskBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
        }
    }

    /// Executor over an in-process worker pool
    pub fn local(config: &TasksConfig) -> Self {
        Self::new(
            Arc::new(LocalTaskBackend::new(config)),
            Duration::from_secs(config.poll_interval_sec),
        )
    }

    /// Poll interval synchronous callers should use with [`Self::touch_task`]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn register_task(&self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Result<()> {
        self.backend.register(kind.as_str(), handler).map_err(|e| {
            error!(task = %kind, error = %e, "failed to register task");
            e
        })
    }

    /// Reserve a task and build its signature without running it.
    ///
    /// The task stays `Pending` until [`Self::dispatch_task`]; callers that
    /// record the signature somewhere do so in between.
    pub async fn prepare_task(&self, kind: TaskKind, args: String, timeout_sec: i64) -> Result<TaskSignature> {
        let uuid = self.backend.reserve(kind.as_str()).await.map_err(|e| {
            error!(task = %kind, error = %e, "failed to reserve task");
            e
        })?;
        Ok(TaskSignature {
            name: kind.as_str().to_string(),
            uuid,
            arg: args,
            timeout_sec,
        })
    }

    pub async fn dispatch_task(&self, signature: &TaskSignature) -> Result<()> {
        self.backend
            .dispatch(&signature.uuid, signature.arg.clone())
            .await
            .map_err(|e| {
                error!(task = %signature.label(), error = %e, "failed to send task");
                e
            })?;
        debug!(task = %signature.label(), timeout_sec = signature.timeout_sec, "task accepted");
        Ok(())
    }

    pub async fn send_task(&self, kind: TaskKind, args: String, timeout_sec: i64) -> Result<TaskSignature> {
        let signature = self.prepare_task(kind, args, timeout_sec).await?;
        if let Err(e) = self.dispatch_task(&signature).await {
            self.purge_task_state(&signature).await;
            return Err(e);
        }
        Ok(signature)
    }

    /// State of the task behind `signature`; `NotFound` when empty or unknown
    pub async fn get_task_state(&self, signature: &TaskSignature) -> Result<TaskState> {
        if signature.is_empty() {
            return Err(KeelError::not_found("task state"));
        }
        let record = self
            .backend
            .state(&signature.uuid)
            .await?
            .ok_or_else(|| KeelError::not_found(format!("task {}", signature.label())))?;
        Ok(TaskState::new(record, signature.timeout_sec, Utc::now()))
    }

    /// Block until the task finishes, polling every `poll_interval`.
    ///
    /// Fails when the task fails or the signature's timeout elapses first.
    pub async fn touch_task(&self, signature: &TaskSignature, poll_interval: Duration) -> Result<()> {
        if signature.is_empty() {
            return Err(KeelError::not_found("task state"));
        }
        let timeout = Duration::from_secs(u64::try_from(signature.timeout_sec).unwrap_or(0));

        let wait = self.wait_finished(signature, poll_interval);
        let result = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout {
                task: signature.label(),
                timeout_sec: signature.timeout_sec,
            }
            .into()),
        };
        if let Err(e) = &result {
            error!(task = %signature.label(), error = %e, "touch task failed");
        }
        result
    }

    async fn wait_finished(&self, signature: &TaskSignature, poll_interval: Duration) -> Result<()> {
        loop {
            let state = self.get_task_state(signature).await?;
            if state.is_finished() {
                if state.is_success() {
                    return Ok(());
                }
                return Err(TaskError::Failed {
                    task: signature.label(),
                    message: state.error_msg().to_string(),
                }
                .into());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Best-effort removal of a task's historical state
    pub async fn purge_task_state(&self, signature: &TaskSignature) {
        if signature.is_empty() {
            return;
        }
        if let Err(e) = self.backend.purge(&signature.uuid).await {
            warn!(task = %signature.label(), error = %e, "failed to purge task state");
        }
    }
}
