//! Payloads of the project tasks

use keel_core::models::{ProjectParams, ReleaseRequest};
use serde::{Deserialize, Serialize};

/// Arguments of `Create-Project-Task` and `Add-Release-Task`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTaskArgs {
    pub namespace: String,
    pub name: String,
    pub project_params: ProjectParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProjectTaskArgs {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub delete_pvcs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeReleaseTaskArgs {
    pub namespace: String,
    pub project_name: String,
    pub release_request: ReleaseRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReleaseTaskArgs {
    pub namespace: String,
    pub name: String,
    pub release_name: String,
    #[serde(default)]
    pub delete_pvcs: bool,
}
