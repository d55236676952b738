//! Pause, recover, restart, and reload

use futures::future::join_all;
use keel_core::{KeelError, Result};
use tracing::{debug, error, info, warn};

use crate::manager::ReleaseManager;

impl ReleaseManager {
    /// Scale the release to zero through the pause plugin; no-op if already paused
    pub async fn pause_release(
        &self,
        namespace: &str,
        name: &str,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        self.set_paused(namespace, name, true, is_async, timeout_sec).await
    }

    /// Undo [`Self::pause_release`]; no-op if not paused
    pub async fn recover_release(
        &self,
        namespace: &str,
        name: &str,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        self.set_paused(namespace, name, false, is_async, timeout_sec).await
    }

    async fn set_paused(
        &self,
        namespace: &str,
        name: &str,
        paused: bool,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let info = self.get_release(namespace, name).await?;
        if info.paused == paused {
            debug!(namespace, name, paused, "release is already in the requested state");
            return Ok(());
        }

        let metadata = self
            .engine
            .chart_metadata(
                &info.spec.repo_name,
                &info.spec.chart_name,
                &info.spec.chart_version,
            )
            .await?;
        if !metadata.supports_plugins {
            let err = KeelError::Unsupported(format!(
                "chart {} of release {}/{} does not support release plugins",
                info.spec.chart_name, namespace, name
            ));
            warn!(error = %err, "cannot change paused state");
            return Err(err);
        }

        self.install_upgrade_release(
            namespace,
            &info.to_request(),
            &[],
            is_async,
            timeout_sec,
            Some(paused),
        )
        .await
    }

    /// Delete every pod of the release's workloads and collect the failures
    pub async fn restart_release(&self, namespace: &str, name: &str) -> Result<()> {
        let info = self.get_release(namespace, name).await?;
        let pods = info.status.pods_need_restart();

        let outcomes = join_all(pods.iter().map(|pod| async move {
            let result = self.cluster.delete_pod(&pod.namespace, &pod.name).await;
            (pod.key(), result)
        }))
        .await;

        let failed: Vec<String> = outcomes
            .into_iter()
            .filter_map(|(pod, result)| {
                result.err().map(|e| {
                    error!(pod = %pod, error = %e, "failed to restart pod");
                    pod
                })
            })
            .collect();
        if !failed.is_empty() {
            return Err(KeelError::RestartFailed { pods: failed });
        }
        info!(namespace, name, pods = pods.len(), "release restarted");
        Ok(())
    }

    /// Re-install the release if the output configs of its dependencies changed
    pub async fn reload_release(&self, namespace: &str, name: &str) -> Result<()> {
        let info = match self.get_release(namespace, name).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                warn!(namespace, name, "release is not found, skipping reload");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let outputs = self
            .engine
            .dependency_output_configs(namespace, &info.spec.dependencies)
            .await?;
        if outputs == info.dependencies_config_values {
            debug!(namespace, name, "dependency configs unchanged");
            return Ok(());
        }

        info!(namespace, name, "dependency configs changed, reloading release");
        self.install_upgrade_release(namespace, &info.to_request(), &[], false, 0, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::fixture::{harness, Harness};
    use keel_core::engine::ChartMetadata;
    use keel_core::models::{ReleaseRequest, PAUSED_MESSAGE};
    use keel_core::KeelError;
    use serde_json::json;

    async fn install(h: &Harness, request: ReleaseRequest) {
        h.manager
            .install_upgrade_release("ns", &request, &[], false, 0, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pause_then_recover() {
        let h = harness();
        install(&h, ReleaseRequest::new("web", "nginx")).await;

        h.manager.pause_release("ns", "web", false, 0).await.unwrap();
        let info = h.manager.get_release("ns", "web").await.unwrap();
        assert!(info.paused);
        assert!(!info.ready);
        assert_eq!(info.message, PAUSED_MESSAGE);
        assert_eq!(h.engine.installs()[1].paused, Some(true));

        h.manager.recover_release("ns", "web", false, 0).await.unwrap();
        let info = h.manager.get_release("ns", "web").await.unwrap();
        assert!(!info.paused);
        assert!(info.ready);
    }

    #[tokio::test]
    async fn test_pause_on_paused_release_is_noop() {
        let h = harness();
        install(&h, ReleaseRequest::new("web", "nginx")).await;
        h.manager.pause_release("ns", "web", false, 0).await.unwrap();
        assert_eq!(h.engine.installs().len(), 2);

        h.manager.pause_release("ns", "web", false, 0).await.unwrap();
        assert_eq!(h.engine.installs().len(), 2);
    }

    #[tokio::test]
    async fn test_recover_running_release_is_noop() {
        let h = harness();
        install(&h, ReleaseRequest::new("web", "nginx")).await;
        h.manager.recover_release("ns", "web", false, 0).await.unwrap();
        assert_eq!(h.engine.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_unsupported_chart() {
        let h = harness();
        h.engine.add_chart_metadata(ChartMetadata {
            name: "legacy".to_string(),
            supports_plugins: false,
            ..Default::default()
        });
        install(&h, ReleaseRequest::new("old", "legacy")).await;

        let err = h.manager.pause_release("ns", "old", false, 0).await.unwrap_err();
        assert!(matches!(err, KeelError::Unsupported(_)));
        assert_eq!(h.engine.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_reports_every_failed_pod() {
        let h = harness();
        install(&h, ReleaseRequest::new("web", "nginx")).await;
        h.cluster.set_pods("ns", "web", &["web-0", "web-1", "web-2"]);
        h.cluster.fail_pod_delete("ns", "web-1");
        h.cluster.fail_pod_delete("ns", "web-2");

        let err = h.manager.restart_release("ns", "web").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to restart pods : [ns/web-1, ns/web-2]"
        );
        assert_eq!(h.cluster.deleted_pods(), vec!["ns/web-0".to_string()]);
    }

    #[tokio::test]
    async fn test_restart_deletes_all_pods() {
        let h = harness();
        install(&h, ReleaseRequest::new("web", "nginx")).await;
        h.cluster.set_pods("ns", "web", &["web-0", "web-1"]);

        h.manager.restart_release("ns", "web").await.unwrap();
        assert_eq!(h.cluster.deleted_pods().len(), 2);
    }

    #[tokio::test]
    async fn test_reload_only_when_dependency_outputs_change() {
        let h = harness();
        install(&h, ReleaseRequest::new("db", "mysql")).await;
        install(&h, ReleaseRequest::new("web", "nginx").with_dependency("mysql", "db")).await;

        h.manager.reload_release("ns", "web").await.unwrap();
        assert_eq!(h.engine.installs().len(), 2);

        let mut outputs = serde_json::Map::new();
        outputs.insert("host".to_string(), json!("db.ns"));
        h.engine.set_output_config("ns", "db", outputs);

        h.manager.reload_release("ns", "web").await.unwrap();
        assert_eq!(h.engine.installs().len(), 3);
        let info = h.manager.get_release("ns", "web").await.unwrap();
        assert_eq!(info.dependencies_config_values["mysql"]["host"], json!("db.ns"));

        h.manager.reload_release("ns", "web").await.unwrap();
        assert_eq!(h.engine.installs().len(), 3);
    }

    #[tokio::test]
    async fn test_reload_missing_release_is_ok() {
        let h = harness();
        h.manager.reload_release("ns", "ghost").await.unwrap();
    }
}
