//! Release specs, requests, cached records, and read models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::cluster::{ResourceMeta, ResourceSet};

/// Plugin that scales a release's workloads to zero while enabled
pub const PAUSE_RELEASE_PLUGIN: &str = "pause-release";

/// Message reported for a paused release
pub const PAUSED_MESSAGE: &str = "Release is paused now";

/// JSON object used for chart values
pub type Values = serde_json::Map<String, serde_json::Value>;

/// Identity and chart coordinates of an installed release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseSpec {
    pub name: String,
    pub namespace: String,
    pub repo_name: String,
    pub chart_name: String,
    pub chart_version: String,
    pub chart_app_version: String,
    pub version: i32,
    pub config_values: Values,
    /// Sub-chart name to the release that satisfies it
    pub dependencies: BTreeMap<String, String>,
}

/// A chart-install plugin attached to a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleasePlugin {
    pub name: String,
    pub args: String,
    pub version: String,
    pub disable: bool,
}

impl ReleasePlugin {
    /// The pause plugin, enabled
    pub fn pause() -> Self {
        Self {
            name: PAUSE_RELEASE_PLUGIN.to_string(),
            ..Default::default()
        }
    }
}

/// Materialized state of an installed release, as stored in the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseRecord {
    #[serde(flatten)]
    pub spec: ReleaseSpec,
    pub labels: BTreeMap<String, String>,
    pub plugins: Vec<ReleasePlugin>,
    pub chart_image: String,
    pub resource_metas: Vec<ResourceMeta>,
    pub computed_values: Values,
    /// Output configs of the dependency releases at install time
    pub dependencies_config_values: Values,
    pub manifest: String,
}

impl ReleaseRecord {
    pub fn key(&self) -> String {
        super::field_key(&self.spec.namespace, &self.spec.name)
    }

    /// Whether an enabled pause plugin is attached
    pub fn is_paused(&self) -> bool {
        is_paused(&self.plugins)
    }
}

fn is_paused(plugins: &[ReleasePlugin]) -> bool {
    plugins
        .iter()
        .any(|p| p.name == PAUSE_RELEASE_PLUGIN && !p.disable)
}

/// An in-memory chart archive entry supplied with a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Install or upgrade request for one release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseRequest {
    pub name: String,
    pub repo_name: String,
    pub chart_name: String,
    pub chart_version: String,
    pub chart_image: String,
    pub config_values: Values,
    pub dependencies: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub plugins: Vec<ReleasePlugin>,
}

impl ReleaseRequest {
    pub fn new(name: impl Into<String>, chart_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart_name: chart_name.into(),
            ..Default::default()
        }
    }

    pub fn with_dependency(mut self, chart: impl Into<String>, release: impl Into<String>) -> Self {
        self.dependencies.insert(chart.into(), release.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config_values.insert(key.into(), value);
        self
    }

    /// Reject requests without a name or without any chart source
    pub fn validate(&self, chart_files: &[ChartFile]) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.chart_name.is_empty() && self.chart_image.is_empty() && chart_files.is_empty() {
            return Err(ValidationError::MissingChartSource);
        }
        Ok(())
    }
}

/// Read model of a release: cached spec plus live readiness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseInfo {
    #[serde(flatten)]
    pub spec: ReleaseSpec,
    pub ready: bool,
    pub message: String,
    #[serde(rename = "releaseStatus")]
    pub status: ResourceSet,
    pub labels: BTreeMap<String, String>,
    pub plugins: Vec<ReleasePlugin>,
    pub paused: bool,
    pub chart_image: String,
    pub computed_values: Values,
    pub dependencies_config_values: Values,
}

impl ReleaseInfo {
    /// Build the read model from a cached record and its resource status
    pub fn from_record(record: &ReleaseRecord, status: ResourceSet) -> Self {
        let paused = record.is_paused();
        let (ready, message) = if paused {
            (false, PAUSED_MESSAGE.to_string())
        } else {
            match status.first_not_ready() {
                Some(resource) => (
                    false,
                    format!(
                        "{} {}/{} is in state {}",
                        resource.kind, resource.namespace, resource.name, resource.state.status
                    ),
                ),
                None => (true, String::new()),
            }
        };
        Self {
            spec: record.spec.clone(),
            ready,
            message,
            status,
            labels: record.labels.clone(),
            plugins: record.plugins.clone(),
            paused,
            chart_image: record.chart_image.clone(),
            computed_values: record.computed_values.clone(),
            dependencies_config_values: record.dependencies_config_values.clone(),
        }
    }

    /// Rebuild the request that would reproduce this release
    pub fn to_request(&self) -> ReleaseRequest {
        ReleaseRequest {
            name: self.spec.name.clone(),
            repo_name: self.spec.repo_name.clone(),
            chart_name: self.spec.chart_name.clone(),
            chart_version: self.spec.chart_version.clone(),
            chart_image: self.chart_image.clone(),
            config_values: self.spec.config_values.clone(),
            dependencies: self.spec.dependencies.clone(),
            labels: self.labels.clone(),
            plugins: self.plugins.clone(),
        }
    }

    pub fn key(&self) -> String {
        super::field_key(&self.spec.namespace, &self.spec.name)
    }
}
