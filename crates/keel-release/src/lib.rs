//! keel release - the release orchestrator
//!
//! Every mutation of a release goes through the same sequence: check the
//! release task pointer for an active task, record the pointer to a newly
//! reserved task, start that task, purge the superseded task state, and
//! optionally wait. The task handlers registered by
//! [`ReleaseManager::register_tasks`] do the actual chart engine and cache
//! work.

mod args;
mod delete;
mod install;
mod lifecycle;
mod manager;
mod query;

pub use args::{CreateReleaseTaskArgs, DeleteReleaseTaskArgs};
pub use manager::{ReleaseManager, ReleaseOptions};

#[cfg(test)]
pub(crate) mod fixture {
    use std::sync::Arc;
    use std::time::Duration;

    use keel_core::config::{CacheConfig, TasksConfig};
    use keel_core::testing::{MemoryChartEngine, MemoryClusterOperator};
    use keel_stores::{MemoryCacheStore, ReleaseCache};
    use keel_tasks::{LocalTaskBackend, TaskExecutor};

    use crate::{ReleaseManager, ReleaseOptions};

    pub struct Harness {
        pub manager: Arc<ReleaseManager>,
        pub engine: Arc<MemoryChartEngine>,
        pub cluster: Arc<MemoryClusterOperator>,
        pub cache: ReleaseCache,
    }

    pub fn harness() -> Harness {
        let engine = Arc::new(MemoryChartEngine::new());
        engine.add_chart("nginx", &[]);
        engine.add_chart("mysql", &[]);
        let cluster = Arc::new(MemoryClusterOperator::new(engine.clone()));
        let cache = ReleaseCache::new(Arc::new(MemoryCacheStore::new()), &CacheConfig::default());
        let executor = Arc::new(TaskExecutor::new(
            Arc::new(LocalTaskBackend::new(&TasksConfig::default())),
            Duration::from_millis(5),
        ));
        let manager = Arc::new(ReleaseManager::new(
            cache.clone(),
            executor,
            engine.clone(),
            cluster.clone(),
            ReleaseOptions::default(),
        ));
        manager.register_tasks().unwrap();
        Harness {
            manager,
            engine,
            cluster,
            cache,
        }
    }
}
