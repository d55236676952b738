//! Task backend seam

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::Result;
use serde::{Deserialize, Serialize};

/// Backend-side status of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// What the backend remembers about a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub uuid: String,
    pub name: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Work bound to a task name
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, args: &str) -> Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, args: &str) -> Result<()> {
        (self.0)(args.to_string()).await
    }
}

/// Wrap an async closure as a [`TaskHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Queue + result store behind the executor
#[async_trait]
pub trait TaskBackend: Send + Sync {
    fn register(&self, name: &str, handler: Arc<dyn TaskHandler>) -> Result<()>;

    /// Record a `Pending` task without running it and return its UUID.
    ///
    /// Nothing runs until [`Self::dispatch`] is called for the UUID.
    async fn reserve(&self, name: &str) -> Result<String>;

    /// Hand a reserved task to the workers
    async fn dispatch(&self, uuid: &str, args: String) -> Result<()>;

    /// Reserve and dispatch in one step
    async fn send(&self, name: &str, args: String) -> Result<String> {
        let uuid = self.reserve(name).await?;
        if let Err(e) = self.dispatch(&uuid, args).await {
            // a reservation that never ran would read as active until timeout
            let _ = self.purge(&uuid).await;
            return Err(e);
        }
        Ok(uuid)
    }

    /// `None` when the backend has no state for `uuid`
    async fn state(&self, uuid: &str) -> Result<Option<TaskRecord>>;

    async fn purge(&self, uuid: &str) -> Result<()>;
}
