//! In-memory collaborators for tests and local experiments
//!
//! [`MemoryChartEngine`] keeps installed releases in a map and records every
//! call it receives. [`MemoryClusterOperator`] derives resource status and
//! release configs from the engine's releases. Both support failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::cluster::ClusterOperator;
use crate::engine::{ChartEngine, ChartMetadata, InstallOptions, SubChartLookup};
use crate::error::{KeelError, Result};
use crate::models::release::Values;
use crate::models::{
    field_key, ChartFile, LabelSelector, Pod, ReleaseConfig, ReleasePlugin, ReleaseRecord,
    ReleaseRequest, ReleaseSpec, Resource, ResourceKind, ResourceMeta, ResourceSet, ResourceState,
    PAUSE_RELEASE_PLUGIN,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One recorded `install_or_upgrade` call
#[derive(Debug, Clone)]
pub struct InstallCall {
    pub namespace: String,
    pub request: ReleaseRequest,
    pub dry_run: bool,
    pub update: bool,
    pub paused: Option<bool>,
}

#[derive(Default)]
struct EngineState {
    charts: HashMap<String, ChartMetadata>,
    releases: BTreeMap<String, ReleaseRecord>,
    listed_duplicates: Vec<ReleaseRecord>,
    outputs: HashMap<String, Values>,
    installs: Vec<InstallCall>,
    deletes: Vec<String>,
    failing_installs: HashSet<String>,
    failing_deletes: HashSet<String>,
    install_delay: Option<Duration>,
}

/// Chart engine that installs releases into a map
#[derive(Default)]
pub struct MemoryChartEngine {
    state: Mutex<EngineState>,
}

impl MemoryChartEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chart with its sub-chart names
    pub fn add_chart(&self, name: &str, dependencies: &[&str]) {
        self.add_chart_metadata(ChartMetadata {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            app_version: "1.0".to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            supports_plugins: true,
            ..Default::default()
        });
    }

    pub fn add_chart_metadata(&self, metadata: ChartMetadata) {
        lock(&self.state).charts.insert(metadata.name.clone(), metadata);
    }

    /// Seed an installed release without going through `install_or_upgrade`
    pub fn insert_release(&self, record: ReleaseRecord) {
        lock(&self.state).releases.insert(record.key(), record);
    }

    /// Drop a release as if an out-of-band actor removed it
    pub fn forget_release(&self, namespace: &str, name: &str) {
        lock(&self.state).releases.remove(&field_key(namespace, name));
    }

    /// Extra entry reported by `list_all_releases`, e.g. an older revision
    pub fn push_listed_duplicate(&self, record: ReleaseRecord) {
        lock(&self.state).listed_duplicates.push(record);
    }

    pub fn set_output_config(&self, namespace: &str, name: &str, values: Values) {
        lock(&self.state)
            .outputs
            .insert(field_key(namespace, name), values);
    }

    pub fn fail_install_for(&self, name: &str) {
        lock(&self.state).failing_installs.insert(name.to_string());
    }

    pub fn fail_delete_for(&self, name: &str) {
        lock(&self.state).failing_deletes.insert(name.to_string());
    }

    /// Make every install sleep before applying
    pub fn set_install_delay(&self, delay: Duration) {
        lock(&self.state).install_delay = Some(delay);
    }

    pub fn release(&self, namespace: &str, name: &str) -> Option<ReleaseRecord> {
        lock(&self.state)
            .releases
            .get(&field_key(namespace, name))
            .cloned()
    }

    pub fn releases(&self) -> Vec<ReleaseRecord> {
        lock(&self.state).releases.values().cloned().collect()
    }

    pub fn installs(&self) -> Vec<InstallCall> {
        lock(&self.state).installs.clone()
    }

    /// `namespace/name` of every delete call
    pub fn deletes(&self) -> Vec<String> {
        lock(&self.state).deletes.clone()
    }

    fn build_record(
        state: &EngineState,
        namespace: &str,
        request: &ReleaseRequest,
        options: &InstallOptions<'_>,
    ) -> ReleaseRecord {
        let key = field_key(namespace, &request.name);
        let version = state.releases.get(&key).map_or(0, |r| r.spec.version) + 1;
        let chart = state.charts.get(&request.chart_name);

        let mut plugins: Vec<ReleasePlugin> = request
            .plugins
            .iter()
            .filter(|p| p.name != PAUSE_RELEASE_PLUGIN || options.paused.is_none())
            .cloned()
            .collect();
        if options.paused == Some(true) {
            plugins.push(ReleasePlugin::pause());
        }

        let dependencies_config_values = dependency_outputs(state, namespace, &request.dependencies);

        ReleaseRecord {
            spec: ReleaseSpec {
                name: request.name.clone(),
                namespace: namespace.to_string(),
                repo_name: request.repo_name.clone(),
                chart_name: request.chart_name.clone(),
                chart_version: chart
                    .map(|c| c.version.clone())
                    .unwrap_or_else(|| request.chart_version.clone()),
                chart_app_version: chart.map(|c| c.app_version.clone()).unwrap_or_default(),
                version,
                config_values: request.config_values.clone(),
                dependencies: request.dependencies.clone(),
            },
            labels: request.labels.clone(),
            plugins,
            chart_image: request.chart_image.clone(),
            resource_metas: vec![ResourceMeta {
                kind: ResourceKind::Deployment,
                namespace: namespace.to_string(),
                name: request.name.clone(),
            }],
            computed_values: request.config_values.clone(),
            dependencies_config_values,
            manifest: format!(
                "kind: Deployment\nmetadata:\n  name: {}\n  namespace: {}\n",
                request.name, namespace
            ),
        }
    }
}

fn dependency_outputs(
    state: &EngineState,
    namespace: &str,
    dependencies: &BTreeMap<String, String>,
) -> Values {
    dependencies
        .iter()
        .filter(|(_, release)| !release.is_empty())
        .filter_map(|(chart, release)| {
            state
                .outputs
                .get(&field_key(namespace, release))
                .map(|values| (chart.clone(), serde_json::Value::Object(values.clone())))
        })
        .collect()
}

#[async_trait]
impl SubChartLookup for MemoryChartEngine {
    async fn chart_auto_dependencies(
        &self,
        _repo: &str,
        chart: &str,
        _version: &str,
    ) -> Result<Vec<String>> {
        lock(&self.state)
            .charts
            .get(chart)
            .map(|c| c.dependencies.clone())
            .ok_or_else(|| KeelError::not_found(format!("chart {}", chart)))
    }
}

#[async_trait]
impl ChartEngine for MemoryChartEngine {
    async fn install_or_upgrade(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        _chart_files: &[ChartFile],
        options: InstallOptions<'_>,
    ) -> Result<ReleaseRecord> {
        let delay = {
            let mut state = lock(&self.state);
            state.installs.push(InstallCall {
                namespace: namespace.to_string(),
                request: request.clone(),
                dry_run: options.dry_run,
                update: options.update,
                paused: options.paused,
            });
            state.install_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.failing_installs.contains(&request.name) {
            return Err(KeelError::upstream(
                "chart engine",
                format!("install release {}/{}", namespace, request.name),
                "injected failure",
            ));
        }
        let record = Self::build_record(&state, namespace, request, &options);
        if !options.dry_run {
            state.releases.insert(record.key(), record.clone());
        }
        Ok(record)
    }

    async fn delete_release(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let key = field_key(namespace, name);
        state.deletes.push(key.clone());
        if state.failing_deletes.contains(name) {
            return Err(KeelError::upstream(
                "chart engine",
                format!("delete release {}", key),
                "injected failure",
            ));
        }
        state.releases.remove(&key);
        Ok(())
    }

    async fn chart_metadata(
        &self,
        _repo: &str,
        chart: &str,
        _version: &str,
    ) -> Result<ChartMetadata> {
        lock(&self.state)
            .charts
            .get(chart)
            .cloned()
            .ok_or_else(|| KeelError::not_found(format!("chart {}", chart)))
    }

    async fn list_all_releases(&self) -> Result<Vec<ReleaseRecord>> {
        let state = lock(&self.state);
        Ok(state
            .releases
            .values()
            .chain(state.listed_duplicates.iter())
            .cloned()
            .collect())
    }

    async fn dependency_output_configs(
        &self,
        namespace: &str,
        dependencies: &BTreeMap<String, String>,
    ) -> Result<Values> {
        Ok(dependency_outputs(&lock(&self.state), namespace, dependencies))
    }
}

#[derive(Default)]
struct ClusterState {
    not_ready: HashSet<String>,
    pods: HashMap<String, Vec<String>>,
    stateful: HashSet<String>,
    failing_pods: HashSet<String>,
    failing_resources: HashSet<String>,
    deleted_pods: Vec<String>,
    deleted_pvcs: Vec<ResourceMeta>,
}

/// Cluster operator whose view is derived from a [`MemoryChartEngine`]
pub struct MemoryClusterOperator {
    engine: Arc<MemoryChartEngine>,
    state: Mutex<ClusterState>,
}

impl MemoryClusterOperator {
    pub fn new(engine: Arc<MemoryChartEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(ClusterState::default()),
        }
    }

    /// Report the resource `namespace/name` as not ready
    pub fn set_not_ready(&self, namespace: &str, name: &str) {
        lock(&self.state).not_ready.insert(field_key(namespace, name));
    }

    pub fn set_ready(&self, namespace: &str, name: &str) {
        lock(&self.state).not_ready.remove(&field_key(namespace, name));
    }

    /// Pods owned by the resource `namespace/name`
    pub fn set_pods(&self, namespace: &str, name: &str, pods: &[&str]) {
        lock(&self.state).pods.insert(
            field_key(namespace, name),
            pods.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Report the resource `namespace/name` as a stateful set
    pub fn mark_stateful(&self, namespace: &str, name: &str) {
        lock(&self.state).stateful.insert(field_key(namespace, name));
    }

    pub fn fail_pod_delete(&self, namespace: &str, pod: &str) {
        lock(&self.state).failing_pods.insert(field_key(namespace, pod));
    }

    /// Fail any status lookup that includes the resource `namespace/name`
    pub fn fail_resource_set_for(&self, namespace: &str, name: &str) {
        lock(&self.state).failing_resources.insert(field_key(namespace, name));
    }

    /// `namespace/name` of every successfully deleted pod
    pub fn deleted_pods(&self) -> Vec<String> {
        lock(&self.state).deleted_pods.clone()
    }

    pub fn deleted_pvcs(&self) -> Vec<ResourceMeta> {
        lock(&self.state).deleted_pvcs.clone()
    }
}

#[async_trait]
impl ClusterOperator for MemoryClusterOperator {
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let key = field_key(namespace, name);
        let mut state = lock(&self.state);
        if state.failing_pods.contains(&key) {
            return Err(KeelError::upstream(
                "cluster operator",
                format!("delete pod {}", key),
                "injected failure",
            ));
        }
        state.deleted_pods.push(key);
        Ok(())
    }

    async fn resource_set(&self, metas: &[ResourceMeta]) -> Result<ResourceSet> {
        let state = lock(&self.state);
        if let Some(meta) = metas
            .iter()
            .find(|m| state.failing_resources.contains(&field_key(&m.namespace, &m.name)))
        {
            return Err(KeelError::upstream(
                "cluster operator",
                format!("resource status {}", field_key(&meta.namespace, &meta.name)),
                "injected failure",
            ));
        }
        let resources = metas
            .iter()
            .map(|meta| {
                let key = field_key(&meta.namespace, &meta.name);
                let kind = if state.stateful.contains(&key) {
                    ResourceKind::StatefulSet
                } else {
                    meta.kind
                };
                let pods = state
                    .pods
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| vec![format!("{}-0", meta.name)]);
                Resource {
                    kind,
                    namespace: meta.namespace.clone(),
                    name: meta.name.clone(),
                    state: if state.not_ready.contains(&key) {
                        ResourceState::pending("Pending")
                    } else {
                        ResourceState::ready()
                    },
                    pods: pods
                        .into_iter()
                        .map(|name| Pod {
                            namespace: meta.namespace.clone(),
                            name,
                            state: ResourceState::ready(),
                        })
                        .collect(),
                }
            })
            .collect();
        Ok(ResourceSet { resources })
    }

    async fn build_manifest_objects(&self, namespace: &str, manifest: &str) -> Result<Vec<Values>> {
        manifest
            .split("\n---\n")
            .map(str::trim)
            .filter(|doc| !doc.is_empty())
            .map(|doc| {
                let mut object: Values = serde_yaml::from_str(doc).map_err(|e| {
                    KeelError::upstream("cluster operator", "build manifest objects", e)
                })?;
                object
                    .entry("metadata")
                    .or_insert_with(|| serde_json::json!({}));
                if let Some(serde_json::Value::Object(meta)) = object.get_mut("metadata") {
                    meta.entry("namespace")
                        .or_insert_with(|| serde_json::Value::String(namespace.to_string()));
                }
                Ok(object)
            })
            .collect()
    }

    async fn delete_stateful_set_pvcs(&self, stateful_sets: &[ResourceMeta]) -> Result<()> {
        lock(&self.state)
            .deleted_pvcs
            .extend(stateful_sets.iter().cloned());
        Ok(())
    }

    async fn list_release_configs(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<ReleaseConfig>> {
        Ok(self
            .engine
            .releases()
            .into_iter()
            .filter(|r| namespace.map_or(true, |ns| r.spec.namespace == ns))
            .filter(|r| selector.matches(&r.labels))
            .map(|r| ReleaseConfig {
                namespace: r.spec.namespace,
                name: r.spec.name,
                labels: r.labels,
                repo: r.spec.repo_name,
                chart_name: r.spec.chart_name,
                chart_version: r.spec.chart_version,
                chart_image: r.chart_image,
                config_values: r.spec.config_values,
                dependencies: r.spec.dependencies,
            })
            .collect())
    }
}
