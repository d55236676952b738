//! keel project - releases grouped under a project label
//!
//! [`ProjectManager`] serializes project mutations the same way the release
//! manager serializes release mutations, one task pointer per project. Its
//! task handlers compose release operations, wiring dependencies between the
//! project's releases with the [`resolver`].

mod args;
pub mod graph;
mod manager;
pub mod resolver;
mod tasks;

pub use args::{DeleteProjectTaskArgs, ProjectTaskArgs, RemoveReleaseTaskArgs, UpgradeReleaseTaskArgs};
pub use graph::DependencyGraph;
pub use manager::{ProjectManager, ProjectOptions};
pub use resolver::{auto_create_release_dependencies, auto_update_release_dependencies};

#[cfg(test)]
pub(crate) mod fixture {
    use std::sync::Arc;
    use std::time::Duration;

    use keel_core::config::{CacheConfig, TasksConfig};
    use keel_core::testing::{MemoryChartEngine, MemoryClusterOperator};
    use keel_release::{ReleaseManager, ReleaseOptions};
    use keel_stores::{MemoryCacheStore, ProjectCache, ReleaseCache};
    use keel_tasks::{LocalTaskBackend, TaskExecutor};

    use crate::{ProjectManager, ProjectOptions};

    pub struct Harness {
        pub projects: Arc<ProjectManager>,
        pub releases: Arc<ReleaseManager>,
        pub engine: Arc<MemoryChartEngine>,
        pub cluster: Arc<MemoryClusterOperator>,
    }

    /// Charts: `chartA` and `chartC` can be wired to `chartB`
    pub fn harness() -> Harness {
        let engine = Arc::new(MemoryChartEngine::new());
        engine.add_chart("chartA", &["chartB"]);
        engine.add_chart("chartB", &[]);
        engine.add_chart("chartC", &["chartB"]);
        let cluster = Arc::new(MemoryClusterOperator::new(engine.clone()));

        let store = Arc::new(MemoryCacheStore::new());
        let cache_config = CacheConfig::default();
        let executor = Arc::new(TaskExecutor::new(
            Arc::new(LocalTaskBackend::new(&TasksConfig::default())),
            Duration::from_millis(5),
        ));
        let releases = Arc::new(ReleaseManager::new(
            ReleaseCache::new(store.clone(), &cache_config),
            executor,
            engine.clone(),
            cluster.clone(),
            ReleaseOptions::default(),
        ));
        releases.register_tasks().unwrap();

        let projects = Arc::new(ProjectManager::new(
            ProjectCache::new(store, &cache_config),
            releases.clone(),
            ProjectOptions::default(),
        ));
        projects.register_tasks().unwrap();
        Harness {
            projects,
            releases,
            engine,
            cluster,
        }
    }
}
