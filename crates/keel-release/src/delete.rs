//! Release deletion

use keel_core::Result;
use keel_tasks::TaskKind;
use tracing::{error, info, warn};

use crate::args::DeleteReleaseTaskArgs;
use crate::manager::ReleaseManager;

impl ReleaseManager {
    /// Delete a release through a `Delete-Release-Task`.
    ///
    /// A release without a task pointer is treated as already deleted.
    pub async fn delete_release(
        &self,
        namespace: &str,
        name: &str,
        delete_pvcs: bool,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let timeout_sec = self.timeout_or_default(timeout_sec);
        let previous = match self.validate_release_task(namespace, name, false).await {
            Ok(previous) => previous,
            Err(e) if e.is_not_found() => {
                warn!(namespace, name, "release task is not found, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let args = DeleteReleaseTaskArgs {
            namespace: namespace.to_string(),
            release_name: name.to_string(),
            delete_pvcs,
        };
        self.send_release_task(
            namespace,
            name,
            TaskKind::DeleteRelease,
            &args,
            previous,
            is_async,
            timeout_sec,
        )
        .await
        .map_err(|e| {
            error!(namespace, name, error = %e, "failed to delete release");
            e
        })
    }

    pub async fn delete_release_with_retry(
        &self,
        namespace: &str,
        name: &str,
        delete_pvcs: bool,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        self.with_retry("delete release", || {
            self.delete_release(namespace, name, delete_pvcs, is_async, timeout_sec)
        })
        .await
    }

    /// Task body of `Delete-Release-Task`
    pub(crate) async fn do_delete_release(
        &self,
        namespace: &str,
        name: &str,
        delete_pvcs: bool,
    ) -> Result<()> {
        let record = match self.cache.get_release_record(namespace, name).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                warn!(namespace, name, "release is not in cache, skipping delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let status = self.cluster.resource_set(&record.resource_metas).await?;

        self.engine.delete_release(namespace, name).await.map_err(|e| {
            error!(namespace, name, error = %e, "chart engine failed to delete release");
            e
        })?;
        self.cache.delete_release_record(namespace, name).await?;

        if delete_pvcs {
            let stateful_sets = status.stateful_sets();
            if !stateful_sets.is_empty() {
                self.cluster
                    .delete_stateful_set_pvcs(&stateful_sets)
                    .await
                    .map_err(|e| {
                        error!(namespace, name, error = %e, "failed to delete stateful set pvcs");
                        e
                    })?;
            }
        }
        info!(namespace, name, delete_pvcs, "release deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::fixture::harness;
    use keel_core::models::ReleaseRequest;

    async fn install(h: &crate::fixture::Harness, name: &str) {
        h.manager
            .install_upgrade_release("ns", &ReleaseRequest::new(name, "nginx"), &[], false, 0, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_release_is_ok() {
        let h = harness();
        h.manager
            .delete_release("ns", "ghost", false, false, 0)
            .await
            .unwrap();
        assert!(h.engine.deletes().is_empty());
    }

    #[tokio::test]
    async fn test_sync_delete_clears_record_and_pointer() {
        let h = harness();
        install(&h, "web").await;

        h.manager
            .delete_release("ns", "web", false, false, 0)
            .await
            .unwrap();
        assert!(h.engine.release("ns", "web").is_none());
        assert!(h.cache.get_release_record("ns", "web").await.unwrap_err().is_not_found());
        assert!(h.cache.get_release_task("ns", "web").await.unwrap_err().is_not_found());
        assert!(h.cluster.deleted_pvcs().is_empty());

        // a second delete finds nothing and succeeds
        h.manager
            .delete_release("ns", "web", false, false, 0)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sync_delete_leaves_no_pointer_on_worker_pool() {
        let h = harness();
        for i in 0..50 {
            let name = format!("web-{}", i);
            install(&h, &name).await;
            h.manager
                .delete_release("ns", &name, false, false, 0)
                .await
                .unwrap();
            assert!(h.cache.get_release_task("ns", &name).await.unwrap_err().is_not_found());
            assert!(h.manager.get_release("ns", &name).await.unwrap_err().is_not_found());
        }
        assert!(h.manager.list_releases(Some("ns")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_pvcs_of_stateful_sets() {
        let h = harness();
        install(&h, "db").await;
        h.cluster.mark_stateful("ns", "db");

        h.manager
            .delete_release("ns", "db", true, false, 0)
            .await
            .unwrap();
        let pvcs = h.cluster.deleted_pvcs();
        assert_eq!(pvcs.len(), 1);
        assert_eq!(pvcs[0].name, "db");
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_pointer() {
        let h = harness();
        install(&h, "web").await;
        h.engine.fail_delete_for("web");

        let err = h
            .manager
            .delete_release("ns", "web", false, false, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert!(h.cache.get_release_task("ns", "web").await.is_ok());
        assert!(h.cache.get_release_record("ns", "web").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_with_retry_succeeds_without_conflict() {
        let h = harness();
        install(&h, "web").await;
        h.manager
            .delete_release_with_retry("ns", "web", false, false, 0)
            .await
            .unwrap();
        assert_eq!(h.engine.deletes(), vec!["ns/web".to_string()]);
    }
}
