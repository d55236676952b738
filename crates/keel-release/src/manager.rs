//! Release manager: single-flight guard, task dispatch, and handler wiring

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use keel_core::config::ReleaseConfigSection;
use keel_core::models::{ReleaseRecord, ReleaseInfo, ReleaseTaskPointer};
use keel_core::{ChartEngine, ClusterOperator, ConflictError, KeelError, Result, TaskScope};
use keel_stores::ReleaseCache;
use keel_tasks::{handler_fn, TaskExecutor, TaskKind};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::args::{CreateReleaseTaskArgs, DeleteReleaseTaskArgs};

/// Tunables of the release manager
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Timeout used when a caller passes zero
    pub default_timeout_sec: i64,
    /// Retries performed by the `*_with_retry` operations
    pub retry_times: u32,
    pub retry_interval: Duration,
}

impl From<&ReleaseConfigSection> for ReleaseOptions {
    fn from(config: &ReleaseConfigSection) -> Self {
        Self {
            default_timeout_sec: config.default_timeout_sec,
            retry_times: config.retry_times,
            retry_interval: Duration::from_secs(config.retry_interval_sec),
        }
    }
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self::from(&ReleaseConfigSection::default())
    }
}

/// Orchestrates release mutations and reads
pub struct ReleaseManager {
    pub(crate) cache: ReleaseCache,
    pub(crate) executor: Arc<TaskExecutor>,
    pub(crate) engine: Arc<dyn ChartEngine>,
    pub(crate) cluster: Arc<dyn ClusterOperator>,
    pub(crate) options: ReleaseOptions,
}

impl ReleaseManager {
    pub fn new(
        cache: ReleaseCache,
        executor: Arc<TaskExecutor>,
        engine: Arc<dyn ChartEngine>,
        cluster: Arc<dyn ClusterOperator>,
        options: ReleaseOptions,
    ) -> Self {
        Self {
            cache,
            executor,
            engine,
            cluster,
            options,
        }
    }

    pub fn cache(&self) -> &ReleaseCache {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    pub fn engine(&self) -> &Arc<dyn ChartEngine> {
        &self.engine
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterOperator> {
        &self.cluster
    }

    /// Bind the create and delete release tasks to this manager.
    ///
    /// Handlers hold a weak reference; tasks that run after the manager is
    /// dropped fail instead of keeping it alive.
    pub fn register_tasks(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.executor.register_task(
            TaskKind::CreateRelease,
            handler_fn(move |args| {
                let weak = weak.clone();
                async move { upgrade(&weak)?.run_create_task(&args).await }
            }),
        )?;

        let weak = Arc::downgrade(self);
        self.executor.register_task(
            TaskKind::DeleteRelease,
            handler_fn(move |args| {
                let weak = weak.clone();
                async move { upgrade(&weak)?.run_delete_task(&args).await }
            }),
        )?;
        Ok(())
    }

    async fn run_create_task(&self, args: &str) -> Result<()> {
        let args: CreateReleaseTaskArgs = serde_json::from_str(args)?;
        self.do_install_upgrade(
            &args.namespace,
            &args.release_request,
            &args.chart_files,
            false,
            args.paused,
        )
        .await
        .map(|_| ())
    }

    async fn run_delete_task(&self, args: &str) -> Result<()> {
        let args: DeleteReleaseTaskArgs = serde_json::from_str(args)?;
        self.do_delete_release(&args.namespace, &args.release_name, args.delete_pvcs)
            .await?;
        if let Err(e) = self
            .cache
            .delete_release_task(&args.namespace, &args.release_name)
            .await
        {
            warn!(
                namespace = %args.namespace,
                name = %args.release_name,
                error = %e,
                "failed to delete release task pointer"
            );
        }
        Ok(())
    }

    pub(crate) fn timeout_or_default(&self, timeout_sec: i64) -> i64 {
        if timeout_sec == 0 {
            self.options.default_timeout_sec
        } else {
            timeout_sec
        }
    }

    /// Reject the mutation if the release's latest task is still active.
    ///
    /// Returns the current pointer so the caller can purge it once superseded.
    /// A missing pointer is `NotFound` unless `allow_missing`.
    pub async fn validate_release_task(
        &self,
        namespace: &str,
        name: &str,
        allow_missing: bool,
    ) -> Result<Option<ReleaseTaskPointer>> {
        let pointer = match self.cache.get_release_task(namespace, name).await {
            Ok(pointer) => pointer,
            Err(e) if e.is_not_found() && allow_missing => return Ok(None),
            Err(e) => {
                if !e.is_not_found() {
                    error!(namespace, name, error = %e, "failed to read release task pointer");
                }
                return Err(e);
            }
        };

        let Some(signature) = pointer.latest_task_signature.as_ref() else {
            return Ok(Some(pointer));
        };
        match self.executor.get_task_state(signature).await {
            Ok(state) if !state.is_finished() && !state.is_timeout() => {
                let conflict = ConflictError {
                    scope: TaskScope::Release,
                    key: pointer.key(),
                    task_name: signature.name.clone(),
                    task_uuid: signature.uuid.clone(),
                };
                warn!(namespace, name, error = %conflict, "release task conflict");
                Err(conflict.into())
            }
            Ok(_) => Ok(Some(pointer)),
            Err(e) if e.is_not_found() => {
                debug!(namespace, name, task = %signature.label(), "previous task state is gone");
                Ok(Some(pointer))
            }
            Err(e) => {
                error!(namespace, name, error = %e, "failed to get release task state");
                Err(e)
            }
        }
    }

    /// Point the release at a new task, start it, and purge the superseded state.
    ///
    /// The pointer is written before the task is dispatched, so a handler
    /// that clears the pointer always runs after the write.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn send_release_task<A: Serialize + Sync>(
        &self,
        namespace: &str,
        name: &str,
        kind: TaskKind,
        args: &A,
        previous: Option<ReleaseTaskPointer>,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let payload = serde_json::to_string(args)?;
        let signature = self.executor.prepare_task(kind, payload, timeout_sec).await?;

        let pointer = ReleaseTaskPointer::new(namespace, name).with_signature(signature.clone());
        if let Err(e) = self.cache.put_release_task(&pointer).await {
            error!(namespace, name, error = %e, "failed to write release task pointer");
            self.executor.purge_task_state(&signature).await;
            return Err(e);
        }
        if let Err(e) = self.executor.dispatch_task(&signature).await {
            self.restore_release_task(namespace, name, previous.as_ref()).await;
            self.executor.purge_task_state(&signature).await;
            return Err(e);
        }

        if let Some(old) = previous.and_then(|p| p.latest_task_signature) {
            self.executor.purge_task_state(&old).await;
        }

        if !is_async {
            self.executor
                .touch_task(&signature, self.executor.poll_interval())
                .await?;
        }
        Ok(())
    }

    /// Put back the pointer a failed dispatch replaced
    async fn restore_release_task(&self, namespace: &str, name: &str, previous: Option<&ReleaseTaskPointer>) {
        let restored = match previous {
            Some(pointer) => self.cache.put_release_task(pointer).await,
            None => self.cache.delete_release_task(namespace, name).await,
        };
        if let Err(e) = restored {
            warn!(namespace, name, error = %e, "failed to restore release task pointer");
        }
    }

    /// Re-run `op` while it fails with a release task conflict
    pub(crate) async fn with_retry<F, Fut>(&self, op: &str, mut f: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut retries = 0;
        loop {
            match f().await {
                Err(e) if e.is_retryable_conflict() && retries < self.options.retry_times => {
                    retries += 1;
                    warn!(operation = op, retry = retries, error = %e, "retrying after conflict");
                    tokio::time::sleep(self.options.retry_interval).await;
                }
                result => return result,
            }
        }
    }

    /// Combine a cached record with its live resource status
    pub(crate) async fn build_release_info(&self, record: &ReleaseRecord) -> Result<ReleaseInfo> {
        let status = self
            .cluster
            .resource_set(&record.resource_metas)
            .await
            .map_err(|e| {
                error!(release = %record.key(), error = %e, "failed to build release status");
                e
            })?;
        Ok(ReleaseInfo::from_record(record, status))
    }
}

fn upgrade(weak: &Weak<ReleaseManager>) -> Result<Arc<ReleaseManager>> {
    weak.upgrade()
        .ok_or_else(|| KeelError::other("release manager is shut down"))
}
