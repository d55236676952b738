//! Chart engine collaborator
//!
//! The engine renders and applies charts. Orchestrators only see this trait;
//! the in-memory implementation lives in [`crate::testing`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChartEntry;
use crate::error::{KeelError, Result};
use crate::models::release::Values;
use crate::models::{ChartFile, ReleaseInfo, ReleaseRecord, ReleaseRequest};

/// Resolves the sub-charts a chart can be wired to
#[async_trait]
pub trait SubChartLookup: Send + Sync {
    /// Names of the charts that `chart` declares as auto-dependencies
    async fn chart_auto_dependencies(
        &self,
        repo: &str,
        chart: &str,
        version: &str,
    ) -> Result<Vec<String>>;
}

/// Chart metadata as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    pub app_version: String,
    pub repo: String,
    pub dependencies: Vec<String>,
    /// Whether the chart honors release plugins such as `pause-release`
    pub supports_plugins: bool,
}

/// Install-time switches passed alongside a request
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions<'a> {
    pub dry_run: bool,
    /// A release with this identity already exists
    pub update: bool,
    pub prior: Option<&'a ReleaseInfo>,
    /// `Some(true)` enables the pause plugin, `Some(false)` removes it
    pub paused: Option<bool>,
}

/// Renders, installs, and removes charts
#[async_trait]
pub trait ChartEngine: SubChartLookup {
    /// Install or upgrade a release and return its materialized record
    async fn install_or_upgrade(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        chart_files: &[ChartFile],
        options: InstallOptions<'_>,
    ) -> Result<ReleaseRecord>;

    async fn delete_release(&self, namespace: &str, name: &str) -> Result<()>;

    async fn chart_metadata(&self, repo: &str, chart: &str, version: &str)
        -> Result<ChartMetadata>;

    /// Every release the engine knows about, across namespaces
    async fn list_all_releases(&self) -> Result<Vec<ReleaseRecord>>;

    /// Current output configs of the releases named in `dependencies`
    async fn dependency_output_configs(
        &self,
        namespace: &str,
        dependencies: &BTreeMap<String, String>,
    ) -> Result<Values>;
}

/// Static sub-chart lookup backed by the configured chart catalog
#[derive(Debug, Clone, Default)]
pub struct ChartCatalog {
    charts: HashMap<String, ChartEntry>,
}

impl ChartCatalog {
    pub fn new(entries: &[ChartEntry]) -> Self {
        let charts = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.clone()))
            .collect();
        Self { charts }
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}

#[async_trait]
impl SubChartLookup for ChartCatalog {
    async fn chart_auto_dependencies(
        &self,
        _repo: &str,
        chart: &str,
        _version: &str,
    ) -> Result<Vec<String>> {
        let entry = self
            .charts
            .get(chart)
            .ok_or_else(|| KeelError::not_found(format!("chart {}", chart)))?;
        debug!(chart, deps = entry.dependencies.len(), "resolved sub-charts from catalog");
        Ok(entry.dependencies.clone())
    }
}
