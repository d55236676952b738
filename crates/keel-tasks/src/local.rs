//! In-process task backend on a tokio worker pool

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use keel_core::config::TasksConfig;
use futures::FutureExt;
use keel_core::{KeelError, Result, TaskError};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::backend::{TaskBackend, TaskHandler, TaskRecord, TaskStatus};
use crate::reporter::{TaskEvent, TaskReporter, TracingReporter};

type Records = Arc<Mutex<HashMap<String, TaskRecord>>>;

fn lock(records: &Records) -> MutexGuard<'_, HashMap<String, TaskRecord>> {
    records.lock().unwrap_or_else(|e| e.into_inner())
}

/// Task backend that runs handlers on spawned tokio tasks
///
/// At most `worker_concurrency` handlers run at once; the rest wait on a
/// semaphore in `Pending`. Finished records older than `results_expire_in_sec`
/// are dropped on the next send.
pub struct LocalTaskBackend {
    queue: String,
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    records: Records,
    semaphore: Arc<Semaphore>,
    results_expire: Duration,
    reporter: Arc<dyn TaskReporter>,
}

impl LocalTaskBackend {
    pub fn new(config: &TasksConfig) -> Self {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    pub fn with_reporter(config: &TasksConfig, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            queue: config.default_queue.clone(),
            handlers: RwLock::new(HashMap::new()),
            records: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(config.worker_concurrency)),
            results_expire: Duration::from_secs(config.results_expire_in_sec),
            reporter,
        }
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn expire_results(&self) {
        let Ok(expire) = chrono::Duration::from_std(self.results_expire) else {
            return;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(expire) else {
            return;
        };
        lock(&self.records).retain(|_, r| !(r.status.is_finished() && r.created_at < cutoff));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn set_status(records: &Records, uuid: &str, status: TaskStatus, error: Option<String>) {
    if let Some(record) = lock(records).get_mut(uuid) {
        record.status = status;
        record.error = error;
    }
}

#[async_trait]
impl TaskBackend for LocalTaskBackend {
    fn register(&self, name: &str, handler: Arc<dyn TaskHandler>) -> Result<()> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.contains_key(name) {
            return Err(TaskError::AlreadyRegistered(name.to_string()).into());
        }
        handlers.insert(name.to_string(), handler);
        debug!(task = name, queue = %self.queue, "registered task handler");
        Ok(())
    }

    async fn reserve(&self, name: &str) -> Result<String> {
        if self.handler(name).is_none() {
            return Err(TaskError::NotRegistered(name.to_string()).into());
        }
        if self.semaphore.is_closed() {
            return Err(TaskError::Rejected {
                task: name.to_string(),
                reason: "worker pool is shut down".to_string(),
            }
            .into());
        }
        self.expire_results();

        let uuid = format!("task_{}", uuid::Uuid::new_v4());
        lock(&self.records).insert(
            uuid.clone(),
            TaskRecord {
                uuid: uuid.clone(),
                name: name.to_string(),
                status: TaskStatus::Pending,
                error: None,
                created_at: Utc::now(),
            },
        );
        Ok(uuid)
    }

    async fn dispatch(&self, uuid: &str, args: String) -> Result<()> {
        let task_name = lock(&self.records)
            .get(uuid)
            .filter(|r| r.status == TaskStatus::Pending)
            .map(|r| r.name.clone())
            .ok_or_else(|| KeelError::not_found(format!("reserved task {}", uuid)))?;
        let handler = self
            .handler(&task_name)
            .ok_or_else(|| TaskError::NotRegistered(task_name.clone()))?;

        let records = self.records.clone();
        let semaphore = self.semaphore.clone();
        let reporter = self.reporter.clone();
        let task_uuid = uuid.to_string();
        self.reporter.report(&TaskEvent::Sent {
            name: task_name.clone(),
            uuid: task_uuid.clone(),
        });
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                warn!(task = %task_name, uuid = %task_uuid, "worker pool closed before task ran");
                set_status(
                    &records,
                    &task_uuid,
                    TaskStatus::Failure,
                    Some("worker pool closed".to_string()),
                );
                return;
            };
            set_status(&records, &task_uuid, TaskStatus::Started, None);
            reporter.report(&TaskEvent::Started {
                name: task_name.clone(),
                uuid: task_uuid.clone(),
            });

            let start = Instant::now();
            let outcome = match AssertUnwindSafe(handler.run(&args)).catch_unwind().await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(panic) => Err(format!("task panicked: {}", panic_message(panic.as_ref()))),
            };
            match outcome {
                Ok(()) => {
                    set_status(&records, &task_uuid, TaskStatus::Success, None);
                    reporter.report(&TaskEvent::Succeeded {
                        name: task_name,
                        uuid: task_uuid,
                        duration: start.elapsed(),
                    });
                }
                Err(error) => {
                    set_status(&records, &task_uuid, TaskStatus::Failure, Some(error.clone()));
                    reporter.report(&TaskEvent::Failed {
                        name: task_name,
                        uuid: task_uuid,
                        duration: start.elapsed(),
                        error,
                    });
                }
            }
        });
        Ok(())
    }

    async fn state(&self, uuid: &str) -> Result<Option<TaskRecord>> {
        Ok(lock(&self.records).get(uuid).cloned())
    }

    async fn purge(&self, uuid: &str) -> Result<()> {
        lock(&self.records).remove(uuid);
        self.reporter.report(&TaskEvent::Purged {
            uuid: uuid.to_string(),
        });
        Ok(())
    }
}

impl Drop for LocalTaskBackend {
    fn drop(&mut self) {
        self.semaphore.close();
    }
}

/// Wait until `uuid` leaves `Pending`/`Started`, for tests
#[cfg(test)]
pub(crate) async fn wait_finished(backend: &LocalTaskBackend, uuid: &str) -> TaskRecord {
    loop {
        if let Ok(Some(record)) = backend.state(uuid).await {
            if record.status.is_finished() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::handler_fn;

    fn backend(concurrency: usize) -> LocalTaskBackend {
        LocalTaskBackend::new(&TasksConfig {
            worker_concurrency: concurrency,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_send_runs_handler() {
        let backend = backend(2);
        backend
            .register("ok", handler_fn(|args: String| async move {
                assert_eq!(args, "{}");
                Ok(())
            }))
            .unwrap();

        let uuid = backend.send("ok", "{}".to_string()).await.unwrap();
        let record = wait_finished(&backend, &uuid).await;
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.name, "ok");
    }

    #[tokio::test]
    async fn test_failed_handler_records_error() {
        let backend = backend(2);
        backend
            .register("bad", handler_fn(|_| async { Err(KeelError::other("boom")) }))
            .unwrap();

        let uuid = backend.send("bad", String::new()).await.unwrap();
        let record = wait_finished(&backend, &uuid).await;
        assert_eq!(record.status, TaskStatus::Failure);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_unregistered_and_duplicate() {
        let backend = backend(1);
        let err = backend.send("missing", String::new()).await.unwrap_err();
        assert!(err.to_string().contains("not registered"));

        backend.register("t", handler_fn(|_| async { Ok(()) })).unwrap();
        assert!(backend.register("t", handler_fn(|_| async { Ok(()) })).is_err());
    }

    #[tokio::test]
    async fn test_purge_forgets_state() {
        let backend = backend(1);
        backend.register("t", handler_fn(|_| async { Ok(()) })).unwrap();
        let uuid = backend.send("t", String::new()).await.unwrap();
        wait_finished(&backend, &uuid).await;

        backend.purge(&uuid).await.unwrap();
        assert!(backend.state(&uuid).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_handler_is_recorded_as_failure() {
        let backend = backend(1);
        backend
            .register("buggy", handler_fn(|_| async { panic!("handler bug") }))
            .unwrap();

        let uuid = backend.send("buggy", String::new()).await.unwrap();
        let record = wait_finished(&backend, &uuid).await;
        assert_eq!(record.status, TaskStatus::Failure);
        assert_eq!(record.error.as_deref(), Some("task panicked: handler bug"));

        // the worker permit is released, so later tasks still run
        backend.register("ok", handler_fn(|_| async { Ok(()) })).unwrap();
        let uuid = backend.send("ok", String::new()).await.unwrap();
        assert_eq!(wait_finished(&backend, &uuid).await.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_reserved_task_runs_only_once_dispatched() {
        let backend = backend(1);
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = runs.clone();
        backend
            .register("t", handler_fn(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }
            }))
            .unwrap();

        let uuid = backend.reserve("t").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let record = backend.state(&uuid).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);

        backend.dispatch(&uuid, String::new()).await.unwrap();
        wait_finished(&backend, &uuid).await;
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);

        // a finished task cannot be dispatched again
        assert!(backend.dispatch(&uuid, String::new()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reserve_unregistered_fails() {
        let backend = backend(1);
        assert!(backend.reserve("missing").await.is_err());
        assert!(backend.dispatch("task_unknown", String::new()).await.is_err());
    }
}
