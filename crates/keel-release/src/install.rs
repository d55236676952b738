//! Install and upgrade

use keel_core::models::{ChartFile, ReleaseRecord, ReleaseRequest};
use keel_core::{reuse_release_request, InstallOptions, Result};
use keel_tasks::TaskKind;
use tracing::{error, info, instrument, warn};

use crate::args::CreateReleaseTaskArgs;
use crate::manager::ReleaseManager;

impl ReleaseManager {
    /// Create or upgrade a release through a `Create-Release-Task`.
    ///
    /// `paused` toggles the pause plugin when set. With `is_async` false the
    /// call waits until the task finishes or `timeout_sec` elapses.
    pub async fn install_upgrade_release(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        chart_files: &[ChartFile],
        is_async: bool,
        timeout_sec: i64,
        paused: Option<bool>,
    ) -> Result<()> {
        if let Err(e) = request.validate(chart_files) {
            error!(namespace, name = %request.name, error = %e, "invalid release request");
            return Err(e.into());
        }
        let timeout_sec = self.timeout_or_default(timeout_sec);

        let previous = self
            .validate_release_task(namespace, &request.name, true)
            .await?;

        let args = CreateReleaseTaskArgs {
            namespace: namespace.to_string(),
            release_request: request.clone(),
            chart_files: chart_files.to_vec(),
            paused,
        };
        self.send_release_task(
            namespace,
            &request.name,
            TaskKind::CreateRelease,
            &args,
            previous,
            is_async,
            timeout_sec,
        )
        .await
        .map_err(|e| {
            error!(namespace, name = %request.name, error = %e, "failed to install release");
            e
        })
    }

    /// [`Self::install_upgrade_release`], retried while another task holds the release
    pub async fn install_upgrade_release_with_retry(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        chart_files: &[ChartFile],
        is_async: bool,
        timeout_sec: i64,
        paused: Option<bool>,
    ) -> Result<()> {
        self.with_retry("install release", || {
            self.install_upgrade_release(namespace, request, chart_files, is_async, timeout_sec, paused)
        })
        .await
    }

    /// Task body of `Create-Release-Task`, also used for dry runs
    #[instrument(skip_all, fields(namespace = %namespace, name = %request.name, dry_run = dry_run))]
    pub(crate) async fn do_install_upgrade(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        chart_files: &[ChartFile],
        dry_run: bool,
        paused: Option<bool>,
    ) -> Result<ReleaseRecord> {
        let cached = match self.cache.get_release_record(namespace, &request.name).await {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                error!(error = %e, "failed to read release cache");
                return Err(e);
            }
        };
        let prior = match &cached {
            Some(record) => Some(self.build_release_info(record).await?),
            None => None,
        };
        let update = prior.is_some();
        let request = match &prior {
            Some(info) => reuse_release_request(info, request)?,
            None => request.clone(),
        };

        let options = InstallOptions {
            dry_run,
            update,
            prior: prior.as_ref(),
            paused,
        };
        let record = match self
            .engine
            .install_or_upgrade(namespace, &request, chart_files, options)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, update, "failed to install release");
                if !dry_run && !update {
                    self.rollback(namespace, &request.name).await;
                }
                return Err(e);
            }
        };

        if !dry_run {
            self.cache.put_release_record(&record).await.map_err(|e| {
                error!(error = %e, "failed to cache release record");
                e
            })?;
            info!(version = record.spec.version, update, "release installed");
        }
        Ok(record)
    }

    async fn rollback(&self, namespace: &str, name: &str) {
        if let Err(e) = self.engine.delete_release(namespace, name).await {
            warn!(namespace, name, error = %e, "failed to roll back release install");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fixture::harness;
    use keel_core::models::ReleaseRequest;
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_install_caches_record() {
        let h = harness();
        let request = ReleaseRequest::new("web", "nginx").with_value("replicas", json!(2));
        h.manager
            .install_upgrade_release("ns", &request, &[], false, 0, None)
            .await
            .unwrap();

        let record = h.cache.get_release_record("ns", "web").await.unwrap();
        assert_eq!(record.spec.version, 1);
        assert_eq!(record.spec.config_values["replicas"], json!(2));
        assert!(!h.engine.installs()[0].update);
    }

    #[tokio::test]
    async fn test_upgrade_reuses_prior_values_and_dependencies() {
        let h = harness();
        let first = ReleaseRequest::new("web", "nginx")
            .with_value("a", json!(1))
            .with_dependency("mysql", "db")
            .with_label("team", "core");
        h.manager
            .install_upgrade_release("ns", &first, &[], false, 0, None)
            .await
            .unwrap();

        let second = ReleaseRequest::new("web", "nginx").with_value("b", json!(2));
        h.manager
            .install_upgrade_release("ns", &second, &[], false, 0, None)
            .await
            .unwrap();

        let record = h.cache.get_release_record("ns", "web").await.unwrap();
        assert_eq!(record.spec.version, 2);
        assert_eq!(record.spec.config_values["a"], json!(1));
        assert_eq!(record.spec.config_values["b"], json!(2));
        assert_eq!(record.spec.dependencies["mysql"], "db");
        assert_eq!(record.labels["team"], "core");
        assert!(h.engine.installs()[1].update);
    }

    #[tokio::test]
    async fn test_missing_chart_source_is_rejected_before_dispatch() {
        let h = harness();
        let request = ReleaseRequest {
            name: "web".to_string(),
            ..Default::default()
        };
        let err = h
            .manager
            .install_upgrade_release("ns", &request, &[], false, 0, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chart name or chart image or chart files"));
        assert!(h.engine.installs().is_empty());
        assert!(h.cache.get_release_task("ns", "web").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_first_install_is_rolled_back() {
        let h = harness();
        h.engine.fail_install_for("web");
        let request = ReleaseRequest::new("web", "nginx");
        let err = h
            .manager
            .install_upgrade_release("ns", &request, &[], false, 0, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert_eq!(h.engine.deletes(), vec!["ns/web".to_string()]);
        assert!(h.cache.get_release_record("ns", "web").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_release() {
        let h = harness();
        let request = ReleaseRequest::new("web", "nginx");
        h.manager
            .install_upgrade_release("ns", &request, &[], false, 0, None)
            .await
            .unwrap();

        h.engine.fail_install_for("web");
        assert!(h
            .manager
            .install_upgrade_release("ns", &request, &[], false, 0, None)
            .await
            .is_err());
        assert!(h.engine.deletes().is_empty());
        assert_eq!(h.cache.get_release_record("ns", "web").await.unwrap().spec.version, 1);
    }
}
