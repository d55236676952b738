//! Bodies of the project tasks

use keel_core::models::{ProjectInfo, ReleaseRequest, Values, PROJECT_NAME_LABEL};
use keel_core::{merge_values, Result, ValidationError};
use tracing::{error, info, instrument, warn};

use crate::args::{
    DeleteProjectTaskArgs, ProjectTaskArgs, RemoveReleaseTaskArgs, UpgradeReleaseTaskArgs,
};
use crate::manager::ProjectManager;
use crate::resolver::{auto_create_release_dependencies, auto_update_release_dependencies};

/// Tag the request with the project label and put `common` under its values
fn prepare_release(project: &str, common: &Values, request: &mut ReleaseRequest) {
    request
        .labels
        .insert(PROJECT_NAME_LABEL.to_string(), project.to_string());
    if !common.is_empty() {
        let mut values = common.clone();
        merge_values(&mut values, &request.config_values, false);
        request.config_values = values;
    }
}

impl ProjectManager {
    #[instrument(skip_all, fields(namespace = %namespace, release = %request.name))]
    async fn install_member(&self, namespace: &str, request: &ReleaseRequest) -> Result<()> {
        self.releases
            .install_upgrade_release_with_retry(namespace, request, &[], false, 0, None)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to install project release");
                e
            })
    }

    pub(crate) async fn run_create_project(&self, args: &str) -> Result<()> {
        let args: ProjectTaskArgs = serde_json::from_str(args)?;
        let ProjectTaskArgs {
            namespace,
            name,
            project_params,
        } = args;

        let mut releases = project_params.releases;
        for release in &mut releases {
            prepare_release(&name, &project_params.common_values, release);
        }
        let ordered =
            auto_create_release_dependencies(&**self.releases.engine(), releases).await?;

        for release in &ordered {
            self.install_member(&namespace, release).await?;
        }
        info!(namespace = %namespace, project = %name, releases = ordered.len(), "project created");
        Ok(())
    }

    pub(crate) async fn run_delete_project(&self, args: &str) -> Result<()> {
        let args: DeleteProjectTaskArgs = serde_json::from_str(args)?;
        let project = self.get_project(&args.namespace, &args.name).await?;

        for release in &project.releases {
            self.releases
                .delete_release_with_retry(&args.namespace, &release.spec.name, args.delete_pvcs, false, 0)
                .await
                .map_err(|e| {
                    error!(namespace = %args.namespace, release = %release.spec.name, error = %e, "failed to delete project release");
                    e
                })?;
        }

        if let Err(e) = self.cache.delete_project_task(&args.namespace, &args.name).await {
            warn!(
                namespace = %args.namespace,
                project = %args.name,
                error = %e,
                "failed to delete project task pointer"
            );
        }
        info!(namespace = %args.namespace, project = %args.name, "project deleted");
        Ok(())
    }

    pub(crate) async fn run_add_releases(&self, args: &str) -> Result<()> {
        let args: ProjectTaskArgs = serde_json::from_str(args)?;
        let ProjectTaskArgs {
            namespace,
            name,
            project_params,
        } = args;

        let project = match self.get_project(&namespace, &name).await {
            Ok(project) => Some(project),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let mut releases = project_params.releases;
        for release in &mut releases {
            prepare_release(&name, &project_params.common_values, release);
        }
        let engine = self.releases.engine();
        let ordered = auto_create_release_dependencies(&**engine, releases).await?;

        for mut release in ordered {
            let affected = match &project {
                Some(project) => {
                    auto_update_release_dependencies(&**engine, project, &mut release, false)
                        .await?
                }
                None => Vec::new(),
            };
            self.install_member(&namespace, &release).await?;
            for dependent in &affected {
                self.install_member(&namespace, dependent).await?;
            }
        }
        info!(namespace = %namespace, project = %name, "releases added to project");
        Ok(())
    }

    pub(crate) async fn run_upgrade_release(&self, args: &str) -> Result<()> {
        let args: UpgradeReleaseTaskArgs = serde_json::from_str(args)?;
        let mut request = args.release_request;
        request
            .labels
            .insert(PROJECT_NAME_LABEL.to_string(), args.project_name.clone());
        self.install_member(&args.namespace, &request).await
    }

    pub(crate) async fn run_remove_release(&self, args: &str) -> Result<()> {
        let args: RemoveReleaseTaskArgs = serde_json::from_str(args)?;
        let project = self.get_project(&args.namespace, &args.name).await?;
        let mut removed = member_request(&project, &args.release_name)?;

        let affected =
            auto_update_release_dependencies(&**self.releases.engine(), &project, &mut removed, true)
                .await?;
        for dependent in &affected {
            self.install_member(&args.namespace, dependent).await?;
        }

        self.releases
            .delete_release_with_retry(&args.namespace, &args.release_name, args.delete_pvcs, false, 0)
            .await?;
        info!(
            namespace = %args.namespace,
            project = %args.name,
            release = %args.release_name,
            rewired = affected.len(),
            "release removed from project"
        );
        Ok(())
    }
}

fn member_request(project: &ProjectInfo, release: &str) -> Result<ReleaseRequest> {
    project
        .release(release)
        .map(|r| r.to_request())
        .ok_or_else(|| {
            ValidationError::ReleaseNotInProject {
                release: release.to_string(),
                project: project.name.clone(),
            }
            .into()
        })
}
