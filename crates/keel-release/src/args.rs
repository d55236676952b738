//! Payloads of the release tasks

use keel_core::models::{ChartFile, ReleaseRequest};
use serde::{Deserialize, Serialize};

/// Arguments of a `Create-Release-Task`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReleaseTaskArgs {
    pub namespace: String,
    pub release_request: ReleaseRequest,
    #[serde(default)]
    pub chart_files: Vec<ChartFile>,
    #[serde(default)]
    pub paused: Option<bool>,
}

/// Arguments of a `Delete-Release-Task`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReleaseTaskArgs {
    pub namespace: String,
    pub release_name: String,
    #[serde(default)]
    pub delete_pvcs: bool,
}
