//! Resync loop

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use keel_core::config::SyncConfig;
use keel_core::models::{LabelSelector, TaskPointer};
use keel_core::{ChartEngine, ClusterOperator, Result};
use keel_stores::codec::decode;
use keel_stores::{CacheStore, PipelineOp, ProjectCache, ReleaseCache};
use keel_tasks::TaskExecutor;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::plan::{CacheSnapshot, SyncPlan};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub resync_interval: Duration,
    /// Wait before retrying a cycle whose transaction aborted
    pub tx_retry_delay: Duration,
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            resync_interval: Duration::from_secs(config.resync_interval_sec),
            tx_retry_delay: Duration::from_secs(config.tx_retry_delay_sec),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Counts of the writes applied by one successful resync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub records_set: usize,
    pub records_deleted: usize,
    pub release_tasks_set: usize,
    pub release_tasks_deleted: usize,
    pub project_tasks_set: usize,
    pub project_tasks_deleted: usize,
    /// Stale pointers kept because their task is still active
    pub pointers_kept: usize,
    /// Cycles run, including the ones whose transaction aborted
    pub attempts: u32,
}

/// Repairs drift between the chart engine / cluster and the cache
pub struct Reconciler {
    releases: ReleaseCache,
    projects: ProjectCache,
    engine: Arc<dyn ChartEngine>,
    cluster: Arc<dyn ClusterOperator>,
    executor: Arc<TaskExecutor>,
    options: SyncOptions,
}

impl Reconciler {
    pub fn new(
        releases: ReleaseCache,
        projects: ProjectCache,
        engine: Arc<dyn ChartEngine>,
        cluster: Arc<dyn ClusterOperator>,
        executor: Arc<TaskExecutor>,
        options: SyncOptions,
    ) -> Self {
        Self {
            releases,
            projects,
            engine,
            cluster,
            executor,
            options,
        }
    }

    /// Run one resync, retrying the whole cycle while the transaction aborts
    pub async fn resync(&self) -> Result<SyncReport> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.sync_once().await {
                Ok(mut report) => {
                    report.attempts = attempts;
                    info!(
                        records_set = report.records_set,
                        records_deleted = report.records_deleted,
                        release_tasks_deleted = report.release_tasks_deleted,
                        project_tasks_deleted = report.project_tasks_deleted,
                        "resynced release cache"
                    );
                    return Ok(report);
                }
                Err(e) if e.is_tx_aborted() => {
                    warn!(
                        attempt = attempts,
                        delay_sec = self.options.tx_retry_delay.as_secs(),
                        "resync transaction aborted, retrying"
                    );
                    tokio::time::sleep(self.options.tx_retry_delay).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to resync release cache");
                    return Err(e);
                }
            }
        }
    }

    /// Resync now, then every `resync_interval` until `shutdown` turns true or closes
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.options.resync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_sec = self.options.resync_interval.as_secs(),
                "starting cache reconciler"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // errors are already logged and the next tick retries
                        let _ = self.resync().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("stopping cache reconciler");
                            break;
                        }
                    }
                }
            }
        })
    }

    #[instrument(skip_all)]
    async fn sync_once(&self) -> Result<SyncReport> {
        let store = self.releases.store();
        let releases_key = self.releases.releases_key();
        let release_tasks_key = self.releases.release_tasks_key();
        let projects_key = self.projects.projects_key();

        let token = store
            .watch(&[releases_key, release_tasks_key, projects_key])
            .await?;

        let authoritative = self.engine.list_all_releases().await.map_err(|e| {
            error!(error = %e, "failed to list releases from chart engine");
            e
        })?;
        let configs = self
            .cluster
            .list_release_configs(None, &LabelSelector::everything())
            .await
            .map_err(|e| {
                error!(error = %e, "failed to list release configs");
                e
            })?;

        let snapshot = CacheSnapshot {
            records: store.hget_all(releases_key).await?,
            release_tasks: read_pointers(store.as_ref(), release_tasks_key).await?,
            project_tasks: read_pointers(store.as_ref(), projects_key).await?,
        };
        let plan = SyncPlan::build(authoritative, &configs, &snapshot)?;
        if plan.is_empty() {
            debug!("cache is up to date");
        }

        let release_tasks_deleted = self.inactive_pointer_keys(&plan.stale_release_tasks).await?;
        let project_tasks_deleted = self.inactive_pointer_keys(&plan.stale_project_tasks).await?;
        let report = SyncReport {
            records_set: plan.records_to_set.len(),
            records_deleted: plan.records_to_delete.len(),
            release_tasks_set: plan.release_tasks_to_set.len(),
            release_tasks_deleted: release_tasks_deleted.len(),
            project_tasks_set: plan.project_tasks_to_set.len(),
            project_tasks_deleted: project_tasks_deleted.len(),
            pointers_kept: plan.stale_release_tasks.len() + plan.stale_project_tasks.len()
                - release_tasks_deleted.len()
                - project_tasks_deleted.len(),
            attempts: 0,
        };

        let mut ops = Vec::new();
        push_sets(&mut ops, releases_key, plan.records_to_set);
        push_deletes(&mut ops, releases_key, plan.records_to_delete);
        push_sets(&mut ops, release_tasks_key, plan.release_tasks_to_set);
        push_deletes(&mut ops, release_tasks_key, release_tasks_deleted);
        push_sets(&mut ops, projects_key, plan.project_tasks_to_set);
        push_deletes(&mut ops, projects_key, project_tasks_deleted);

        store.exec(token, ops).await?;
        Ok(report)
    }

    /// Keys of the pointers whose task is finished, timed out, or unknown
    async fn inactive_pointer_keys(&self, pointers: &[TaskPointer]) -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(pointers.len());
        for pointer in pointers {
            let Some(signature) = pointer.latest_task_signature.as_ref() else {
                keys.push(pointer.key());
                continue;
            };
            match self.executor.get_task_state(signature).await {
                Ok(state) if state.is_finished() || state.is_timeout() => keys.push(pointer.key()),
                Ok(_) => {
                    debug!(pointer = %pointer.key(), task = %signature.label(), "keeping pointer of active task");
                }
                Err(e) if e.is_not_found() => keys.push(pointer.key()),
                Err(e) => {
                    error!(pointer = %pointer.key(), error = %e, "failed to get task state");
                    return Err(e);
                }
            }
        }
        Ok(keys)
    }
}

async fn read_pointers(store: &dyn CacheStore, key: &str) -> Result<BTreeMap<String, TaskPointer>> {
    let mut pointers = BTreeMap::new();
    for (field, raw) in store.hget_all(key).await? {
        let pointer: TaskPointer = decode(key, &field, &raw)?;
        pointers.insert(field, pointer);
    }
    Ok(pointers)
}

fn push_sets(ops: &mut Vec<PipelineOp>, key: &str, fields: BTreeMap<String, String>) {
    ops.extend(
        fields
            .into_iter()
            .map(|(field, value)| PipelineOp::hset(key, field, value)),
    );
}

fn push_deletes(ops: &mut Vec<PipelineOp>, key: &str, fields: Vec<String>) {
    if !fields.is_empty() {
        ops.push(PipelineOp::hdel(key, fields));
    }
}
