//! Project parameters and read model

use serde::{Deserialize, Serialize};

use super::release::{ReleaseInfo, ReleaseRequest, Values};

/// Label that ties a release to its project
pub const PROJECT_NAME_LABEL: &str = "Project-Name";

/// Message reported for a project with no releases
pub const EMPTY_PROJECT_MESSAGE: &str = "no release can be found";

/// Parameters for creating a project or adding releases to one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectParams {
    /// Values merged under every release's own config values
    pub common_values: Values,
    pub releases: Vec<ReleaseRequest>,
}

/// Aggregated view of every release carrying the project label
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub name: String,
    pub namespace: String,
    pub releases: Vec<ReleaseInfo>,
    pub ready: bool,
    pub message: String,
}

impl ProjectInfo {
    /// Build a project from its member releases, deriving readiness
    pub fn from_releases(
        namespace: impl Into<String>,
        name: impl Into<String>,
        releases: Vec<ReleaseInfo>,
    ) -> Self {
        let (ready, message) = if releases.is_empty() {
            (false, EMPTY_PROJECT_MESSAGE.to_string())
        } else {
            match releases.iter().find(|r| !r.ready) {
                Some(release) => (false, release.message.clone()),
                None => (true, String::new()),
            }
        };
        Self {
            name: name.into(),
            namespace: namespace.into(),
            releases,
            ready,
            message,
        }
    }

    pub fn release(&self, name: &str) -> Option<&ReleaseInfo> {
        self.releases.iter().find(|r| r.spec.name == name)
    }

    pub fn key(&self) -> String {
        super::field_key(&self.namespace, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, ready: bool, message: &str) -> ReleaseInfo {
        let mut info = ReleaseInfo {
            ready,
            message: message.to_string(),
            ..Default::default()
        };
        info.spec.name = name.to_string();
        info
    }

    #[test]
    fn test_empty_project_is_not_ready() {
        let project = ProjectInfo::from_releases("ns", "demo", Vec::new());
        assert!(!project.ready);
        assert_eq!(project.message, EMPTY_PROJECT_MESSAGE);
    }

    #[test]
    fn test_first_unready_release_message_wins() {
        let project = ProjectInfo::from_releases(
            "ns",
            "demo",
            vec![
                release("a", true, ""),
                release("b", false, "b is starting"),
                release("c", false, "c is starting"),
            ],
        );
        assert!(!project.ready);
        assert_eq!(project.message, "b is starting");
        assert!(project.release("c").is_some());
    }

    #[test]
    fn test_params_accept_camel_case() {
        let params: ProjectParams = serde_json::from_str(
            r#"{"commonValues":{"replicas":2},"releases":[{"name":"a","chartName":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(params.common_values["replicas"], 2);
        assert_eq!(params.releases[0].chart_name, "x");
    }
}
