//! Project manager: single-flight per project, dispatch, and reads

use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use keel_core::config::ProjectConfigSection;
use keel_core::models::{
    ProjectInfo, ProjectParams, ProjectTaskPointer, ReleaseRequest, PROJECT_NAME_LABEL,
};
use keel_core::{ConflictError, KeelError, Result, TaskScope, ValidationError};
use keel_release::ReleaseManager;
use keel_stores::ProjectCache;
use keel_tasks::{handler_fn, TaskHandler, TaskKind};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::args::{
    DeleteProjectTaskArgs, ProjectTaskArgs, RemoveReleaseTaskArgs, UpgradeReleaseTaskArgs,
};

#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Timeout used when a caller passes zero
    pub default_timeout_sec: i64,
}

impl From<&ProjectConfigSection> for ProjectOptions {
    fn from(config: &ProjectConfigSection) -> Self {
        Self {
            default_timeout_sec: config.default_timeout_sec,
        }
    }
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self::from(&ProjectConfigSection::default())
    }
}

/// Orchestrates project mutations on top of a [`ReleaseManager`]
pub struct ProjectManager {
    pub(crate) cache: ProjectCache,
    pub(crate) releases: Arc<ReleaseManager>,
    options: ProjectOptions,
}

impl ProjectManager {
    pub fn new(cache: ProjectCache, releases: Arc<ReleaseManager>, options: ProjectOptions) -> Self {
        Self {
            cache,
            releases,
            options,
        }
    }

    /// Bind the five project tasks to this manager
    pub fn register_tasks(self: &Arc<Self>) -> Result<()> {
        let executor = self.releases.executor();
        executor.register_task(
            TaskKind::CreateProject,
            self.bind(|m, args| async move { m.run_create_project(&args).await }),
        )?;
        executor.register_task(
            TaskKind::DeleteProject,
            self.bind(|m, args| async move { m.run_delete_project(&args).await }),
        )?;
        executor.register_task(
            TaskKind::AddReleases,
            self.bind(|m, args| async move { m.run_add_releases(&args).await }),
        )?;
        executor.register_task(
            TaskKind::UpgradeReleaseInProject,
            self.bind(|m, args| async move { m.run_upgrade_release(&args).await }),
        )?;
        executor.register_task(
            TaskKind::RemoveReleaseInProject,
            self.bind(|m, args| async move { m.run_remove_release(&args).await }),
        )?;
        Ok(())
    }

    fn bind<F, Fut>(self: &Arc<Self>, f: F) -> Arc<dyn TaskHandler>
    where
        F: Fn(Arc<Self>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        handler_fn(move |args| {
            let run = weak.upgrade().map(|manager| f(manager, args));
            async move {
                match run {
                    Some(run) => run.await,
                    None => Err(KeelError::other("project manager is shut down")),
                }
            }
        })
    }

    fn timeout_or_default(&self, timeout_sec: i64) -> i64 {
        if timeout_sec == 0 {
            self.options.default_timeout_sec
        } else {
            timeout_sec
        }
    }

    pub async fn create_project(
        &self,
        namespace: &str,
        name: &str,
        params: ProjectParams,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        if params.releases.is_empty() {
            return Err(ValidationError::EmptyProject.into());
        }
        let timeout_sec = self.timeout_or_default(timeout_sec);
        let previous = self.validate_project_task(namespace, name, true).await?;

        let args = ProjectTaskArgs {
            namespace: namespace.to_string(),
            name: name.to_string(),
            project_params: params,
        };
        self.send_project_task(namespace, name, TaskKind::CreateProject, &args, previous, is_async, timeout_sec)
            .await?;
        info!(namespace, name, "project create accepted");
        Ok(())
    }

    /// Delete every release of the project; a missing project is not an error
    pub async fn delete_project(
        &self,
        namespace: &str,
        name: &str,
        delete_pvcs: bool,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let Some(previous) = self.validate_existing(namespace, name).await? else {
            return Ok(());
        };
        let timeout_sec = self.timeout_or_default(timeout_sec);

        let args = DeleteProjectTaskArgs {
            namespace: namespace.to_string(),
            name: name.to_string(),
            delete_pvcs,
        };
        self.send_project_task(namespace, name, TaskKind::DeleteProject, &args, Some(previous), is_async, timeout_sec)
            .await?;
        info!(namespace, name, "project delete accepted");
        Ok(())
    }

    pub async fn add_releases_in_project(
        &self,
        namespace: &str,
        name: &str,
        params: ProjectParams,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        if params.releases.is_empty() {
            return Err(ValidationError::EmptyProject.into());
        }
        let previous = self.validate_project_task(namespace, name, true).await?;
        let timeout_sec = self.timeout_or_default(timeout_sec);

        let args = ProjectTaskArgs {
            namespace: namespace.to_string(),
            name: name.to_string(),
            project_params: params,
        };
        self.send_project_task(namespace, name, TaskKind::AddReleases, &args, previous, is_async, timeout_sec)
            .await?;
        info!(namespace, name, "add releases accepted");
        Ok(())
    }

    /// Upgrade one member release; upgrading a non-member is rejected
    pub async fn upgrade_release_in_project(
        &self,
        namespace: &str,
        name: &str,
        request: ReleaseRequest,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let Some(previous) = self.validate_existing(namespace, name).await? else {
            return Ok(());
        };
        let project = self.build_project_info(&previous).await?;
        if project.release(&request.name).is_none() {
            let err = ValidationError::ReleaseNotInProject {
                release: request.name.clone(),
                project: name.to_string(),
            };
            error!(namespace, error = %err, "cannot upgrade release");
            return Err(err.into());
        }
        let timeout_sec = self.timeout_or_default(timeout_sec);

        let release = request.name.clone();
        let args = UpgradeReleaseTaskArgs {
            namespace: namespace.to_string(),
            project_name: name.to_string(),
            release_request: request,
        };
        self.send_project_task(
            namespace,
            name,
            TaskKind::UpgradeReleaseInProject,
            &args,
            Some(previous),
            is_async,
            timeout_sec,
        )
        .await?;
        info!(namespace, name, release = %release, "release upgrade in project accepted");
        Ok(())
    }

    /// Remove one member release; removing a non-member is a no-op
    pub async fn remove_release_in_project(
        &self,
        namespace: &str,
        name: &str,
        release_name: &str,
        delete_pvcs: bool,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let Some(previous) = self.validate_existing(namespace, name).await? else {
            return Ok(());
        };
        let project = self.build_project_info(&previous).await?;
        if project.release(release_name).is_none() {
            warn!(namespace, name, release = release_name, "release is not in project, nothing to remove");
            return Ok(());
        }
        let timeout_sec = self.timeout_or_default(timeout_sec);

        let args = RemoveReleaseTaskArgs {
            namespace: namespace.to_string(),
            name: name.to_string(),
            release_name: release_name.to_string(),
            delete_pvcs,
        };
        self.send_project_task(
            namespace,
            name,
            TaskKind::RemoveReleaseInProject,
            &args,
            Some(previous),
            is_async,
            timeout_sec,
        )
        .await?;
        info!(namespace, name, release = release_name, "release removal from project accepted");
        Ok(())
    }

    pub async fn get_project(&self, namespace: &str, name: &str) -> Result<ProjectInfo> {
        let pointer = self.cache.get_project_task(namespace, name).await?;
        self.build_project_info(&pointer).await
    }

    /// Every project of `namespace`, or of all namespaces
    pub async fn list_projects(&self, namespace: Option<&str>) -> Result<Vec<ProjectInfo>> {
        let pointers = self.cache.get_project_tasks(namespace).await?;
        try_join_all(pointers.iter().map(|p| self.build_project_info(p)))
            .await
            .map_err(|e| {
                error!(error = %e, "failed to build project infos");
                e
            })
    }

    async fn build_project_info(&self, pointer: &ProjectTaskPointer) -> Result<ProjectInfo> {
        let selector = format!("{}={}", PROJECT_NAME_LABEL, pointer.name);
        let releases = self
            .releases
            .list_releases_by_labels(Some(&pointer.namespace), &selector)
            .await?;
        let mut info = ProjectInfo::from_releases(&pointer.namespace, &pointer.name, releases);

        let Some(signature) = pointer.latest_task_signature.as_ref() else {
            return Ok(info);
        };
        match self.releases.executor().get_task_state(signature).await {
            Ok(state) if !state.is_finished() => {
                info.ready = false;
                info.message = format!(
                    "please wait for the project latest task {} finished",
                    signature.label()
                );
            }
            Ok(state) if !state.is_success() => {
                info.ready = false;
                info.message = format!(
                    "the project latest task {} failed : {}",
                    signature.label(),
                    state.error_msg()
                );
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(project = %pointer.key(), error = %e, "failed to get project task state");
                return Err(e);
            }
        }
        Ok(info)
    }

    /// Reject the mutation if the project's latest task is still active
    pub async fn validate_project_task(
        &self,
        namespace: &str,
        name: &str,
        allow_missing: bool,
    ) -> Result<Option<ProjectTaskPointer>> {
        let pointer = match self.cache.get_project_task(namespace, name).await {
            Ok(pointer) => pointer,
            Err(e) if e.is_not_found() && allow_missing => return Ok(None),
            Err(e) => {
                if !e.is_not_found() {
                    error!(namespace, name, error = %e, "failed to read project task pointer");
                }
                return Err(e);
            }
        };

        let Some(signature) = pointer.latest_task_signature.as_ref() else {
            return Ok(Some(pointer));
        };
        match self.releases.executor().get_task_state(signature).await {
            Ok(state) if !state.is_finished() && !state.is_timeout() => {
                let conflict = ConflictError {
                    scope: TaskScope::Project,
                    key: pointer.key(),
                    task_name: signature.name.clone(),
                    task_uuid: signature.uuid.clone(),
                };
                warn!(namespace, name, error = %conflict, "project task conflict");
                Err(conflict.into())
            }
            Ok(_) => Ok(Some(pointer)),
            Err(e) if e.is_not_found() => Ok(Some(pointer)),
            Err(e) => {
                error!(namespace, name, error = %e, "failed to get project task state");
                Err(e)
            }
        }
    }

    /// Validate a mutation that needs the project to exist; `None` when it does not
    async fn validate_existing(&self, namespace: &str, name: &str) -> Result<Option<ProjectTaskPointer>> {
        match self.validate_project_task(namespace, name, false).await {
            Ok(pointer) => Ok(pointer),
            Err(e) if e.is_not_found() => {
                warn!(namespace, name, "project is not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_project_task<A: Serialize + Sync>(
        &self,
        namespace: &str,
        name: &str,
        kind: TaskKind,
        args: &A,
        previous: Option<ProjectTaskPointer>,
        is_async: bool,
        timeout_sec: i64,
    ) -> Result<()> {
        let executor = self.releases.executor();
        let payload = serde_json::to_string(args)?;
        let signature = executor.prepare_task(kind, payload, timeout_sec).await?;

        let pointer = ProjectTaskPointer::new(namespace, name).with_signature(signature.clone());
        if let Err(e) = self.cache.put_project_task(&pointer).await {
            error!(namespace, name, error = %e, "failed to write project task pointer");
            executor.purge_task_state(&signature).await;
            return Err(e);
        }
        if let Err(e) = executor.dispatch_task(&signature).await {
            let restored = match previous.as_ref() {
                Some(pointer) => self.cache.put_project_task(pointer).await,
                None => self.cache.delete_project_task(namespace, name).await,
            };
            if let Err(restore_err) = restored {
                warn!(namespace, name, error = %restore_err, "failed to restore project task pointer");
            }
            executor.purge_task_state(&signature).await;
            return Err(e);
        }

        if let Some(old) = previous.and_then(|p| p.latest_task_signature) {
            executor.purge_task_state(&old).await;
        }

        if !is_async {
            debug!(namespace, name, task = %signature.label(), "waiting for project task");
            executor
                .touch_task(&signature, executor.poll_interval())
                .await
                .map_err(|e| {
                    error!(namespace, name, task = %kind, error = %e, "project task failed or timed out");
                    e
                })?;
        }
        Ok(())
    }
}
