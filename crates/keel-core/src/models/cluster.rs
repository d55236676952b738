//! Cluster-side views: resource status, pods, release configs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Resource state reported as ready
pub const READY_STATE: &str = "Ready";

/// Kinds of cluster resources a release can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    Service,
    ConfigMap,
    Secret,
    Ingress,
    PersistentVolumeClaim,
    ReleaseConfig,
}

impl ResourceKind {
    /// Kinds whose pods are recreated by a controller when deleted
    pub fn restarts_pods(&self) -> bool {
        matches!(self, Self::Deployment | Self::StatefulSet | Self::DaemonSet)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Reference to one resource rendered by a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

/// Observed state of a resource or pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceState {
    pub status: String,
    pub reason: String,
    pub message: String,
}

impl ResourceState {
    /// A ready state
    pub fn ready() -> Self {
        Self {
            status: READY_STATE.to_string(),
            ..Default::default()
        }
    }

    /// A non-ready state with the given status
    pub fn pending(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == READY_STATE
    }
}

/// A pod owned by a release workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub state: ResourceState,
}

impl Pod {
    pub fn key(&self) -> String {
        super::field_key(&self.namespace, &self.name)
    }
}

/// A resource with its observed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub state: ResourceState,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl Resource {
    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            kind: self.kind,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Aggregated status of every resource a release owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourceSet {
    /// First resource that is not ready, if any
    pub fn first_not_ready(&self) -> Option<&Resource> {
        self.resources.iter().find(|r| !r.state.is_ready())
    }

    pub fn is_ready(&self) -> bool {
        self.first_not_ready().is_none()
    }

    /// Pods of deployments, stateful sets, and daemon sets
    pub fn pods_need_restart(&self) -> Vec<&Pod> {
        self.resources
            .iter()
            .filter(|r| r.kind.restarts_pods())
            .flat_map(|r| r.pods.iter())
            .collect()
    }

    /// Metadata of the stateful sets, used for PVC cleanup
    pub fn stateful_sets(&self) -> Vec<ResourceMeta> {
        self.resources
            .iter()
            .filter(|r| r.kind == ResourceKind::StatefulSet)
            .map(Resource::meta)
            .collect()
    }
}

/// Cluster-side record of a release's declared configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseConfig {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub repo: String,
    pub chart_name: String,
    pub chart_version: String,
    pub chart_image: String,
    pub config_values: serde_json::Map<String, serde_json::Value>,
    pub dependencies: BTreeMap<String, String>,
}

/// Equality-based label selector, `k=v[,k=v]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector that matches everything
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector with a single `key=value` requirement
    pub fn with_label(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut requirements = BTreeMap::new();
        requirements.insert(key.into(), value.into());
        Self { requirements }
    }

    /// Parse `k=v[,k=v]`; an empty string selects everything
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let mut requirements = BTreeMap::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ValidationError::InvalidLabelSelector(s.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ValidationError::InvalidLabelSelector(s.to_string()));
            }
            requirements.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(kind: ResourceKind, name: &str, ready: bool, pods: &[&str]) -> Resource {
        Resource {
            kind,
            namespace: "ns".to_string(),
            name: name.to_string(),
            state: if ready {
                ResourceState::ready()
            } else {
                ResourceState::pending("Pending")
            },
            pods: pods
                .iter()
                .map(|p| Pod {
                    namespace: "ns".to_string(),
                    name: p.to_string(),
                    state: ResourceState::ready(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_pods_need_restart_skips_jobs() {
        let set = ResourceSet {
            resources: vec![
                resource(ResourceKind::Deployment, "web", true, &["web-1", "web-2"]),
                resource(ResourceKind::Job, "init", true, &["init-1"]),
                resource(ResourceKind::StatefulSet, "db", true, &["db-0"]),
            ],
        };
        let pods: Vec<String> = set.pods_need_restart().iter().map(|p| p.name.clone()).collect();
        assert_eq!(pods, vec!["web-1", "web-2", "db-0"]);
        assert_eq!(set.stateful_sets().len(), 1);
    }

    #[test]
    fn test_first_not_ready() {
        let set = ResourceSet {
            resources: vec![
                resource(ResourceKind::Service, "svc", true, &[]),
                resource(ResourceKind::Deployment, "web", false, &[]),
            ],
        };
        assert!(!set.is_ready());
        assert_eq!(set.first_not_ready().unwrap().name, "web");
        assert!(ResourceSet::default().is_ready());
    }

    #[test]
    fn test_label_selector_parse_and_match() {
        let selector = LabelSelector::parse("Project-Name=demo, tier = db").unwrap();
        let mut labels = BTreeMap::new();
        labels.insert("Project-Name".to_string(), "demo".to_string());
        assert!(!selector.matches(&labels));
        labels.insert("tier".to_string(), "db".to_string());
        assert!(selector.matches(&labels));
        assert_eq!(selector.to_string(), "Project-Name=demo,tier=db");
    }

    #[test]
    fn test_label_selector_rejects_garbage() {
        assert!(LabelSelector::parse("novalue").is_err());
        assert!(LabelSelector::parse("=x").is_err());
        assert!(LabelSelector::parse("").unwrap().is_empty());
    }
}
