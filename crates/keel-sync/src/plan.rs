//! Diff between authoritative state and the cache

use std::collections::BTreeMap;

use keel_core::models::{field_key, ReleaseConfig, ReleaseRecord, TaskPointer, PROJECT_NAME_LABEL};
use keel_core::Result;
use keel_stores::codec::encode;

/// What one resync read from the cache, keyed by `namespace/name`
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheSnapshot {
    /// Encoded release records
    pub records: BTreeMap<String, String>,
    pub release_tasks: BTreeMap<String, TaskPointer>,
    pub project_tasks: BTreeMap<String, TaskPointer>,
}

/// Corrective writes for one resync cycle.
///
/// Stale task pointers are only candidates: the reconciler drops the ones
/// whose task is still active before anything is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Encoded records that are missing from the cache or differ from it
    pub records_to_set: BTreeMap<String, String>,
    pub records_to_delete: Vec<String>,
    /// Encoded signature-less pointers for releases the cache does not track
    pub release_tasks_to_set: BTreeMap<String, String>,
    pub stale_release_tasks: Vec<TaskPointer>,
    pub project_tasks_to_set: BTreeMap<String, String>,
    pub stale_project_tasks: Vec<TaskPointer>,
}

impl SyncPlan {
    pub(crate) fn build(
        releases: Vec<ReleaseRecord>,
        configs: &[ReleaseConfig],
        cached: &CacheSnapshot,
    ) -> Result<Self> {
        let latest = latest_records(releases);
        let projects = project_pointers(configs);
        let mut plan = Self::default();

        for (key, record) in &latest {
            let encoded = encode(record)?;
            if cached.records.get(key) != Some(&encoded) {
                plan.records_to_set.insert(key.clone(), encoded);
            }
            if !cached.release_tasks.contains_key(key) {
                let pointer = TaskPointer::new(&record.spec.namespace, &record.spec.name);
                plan.release_tasks_to_set.insert(key.clone(), encode(&pointer)?);
            }
        }
        plan.records_to_delete = cached
            .records
            .keys()
            .filter(|key| !latest.contains_key(*key))
            .cloned()
            .collect();
        plan.stale_release_tasks = cached
            .release_tasks
            .iter()
            .filter(|(key, _)| !latest.contains_key(*key))
            .map(|(_, pointer)| pointer.clone())
            .collect();

        for (key, pointer) in &projects {
            if !cached.project_tasks.contains_key(key) {
                plan.project_tasks_to_set.insert(key.clone(), encode(pointer)?);
            }
        }
        plan.stale_project_tasks = cached
            .project_tasks
            .iter()
            .filter(|(key, _)| !projects.contains_key(*key))
            .map(|(_, pointer)| pointer.clone())
            .collect();

        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.records_to_set.is_empty()
            && self.records_to_delete.is_empty()
            && self.release_tasks_to_set.is_empty()
            && self.stale_release_tasks.is_empty()
            && self.project_tasks_to_set.is_empty()
            && self.stale_project_tasks.is_empty()
    }
}

/// One record per release; the highest version wins among duplicates
fn latest_records(releases: Vec<ReleaseRecord>) -> BTreeMap<String, ReleaseRecord> {
    let mut latest: BTreeMap<String, ReleaseRecord> = BTreeMap::new();
    for record in releases {
        let key = record.key();
        match latest.get(&key) {
            Some(existing) if existing.spec.version >= record.spec.version => {}
            _ => {
                latest.insert(key, record);
            }
        }
    }
    latest
}

/// One signature-less pointer per project label found on a release config
fn project_pointers(configs: &[ReleaseConfig]) -> BTreeMap<String, TaskPointer> {
    configs
        .iter()
        .filter_map(|config| {
            let project = config.labels.get(PROJECT_NAME_LABEL)?;
            Some((
                field_key(&config.namespace, project),
                TaskPointer::new(&config.namespace, project),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::models::{ReleaseSpec, TaskSignature};

    fn record(namespace: &str, name: &str, version: i32) -> ReleaseRecord {
        ReleaseRecord {
            spec: ReleaseSpec {
                namespace: namespace.to_string(),
                name: name.to_string(),
                version,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn config(namespace: &str, name: &str, project: Option<&str>) -> ReleaseConfig {
        let mut config = ReleaseConfig {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        if let Some(project) = project {
            config
                .labels
                .insert(PROJECT_NAME_LABEL.to_string(), project.to_string());
        }
        config
    }

    #[test]
    fn test_highest_version_wins() {
        let latest = latest_records(vec![
            record("ns", "a", 2),
            record("ns", "a", 5),
            record("ns", "a", 3),
        ]);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["ns/a"].spec.version, 5);
    }

    #[test]
    fn test_projects_are_grouped_by_label() {
        let pointers = project_pointers(&[
            config("ns", "a", Some("shop")),
            config("ns", "b", Some("shop")),
            config("other", "c", Some("shop")),
            config("ns", "d", None),
        ]);
        let keys: Vec<&str> = pointers.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ns/shop", "other/shop"]);
        assert!(pointers["ns/shop"].latest_task_signature.is_none());
    }

    #[test]
    fn test_empty_cache_gets_everything() {
        let plan = SyncPlan::build(
            vec![record("ns", "a", 1)],
            &[config("ns", "a", Some("shop"))],
            &CacheSnapshot::default(),
        )
        .unwrap();
        assert_eq!(plan.records_to_set.len(), 1);
        assert!(plan.release_tasks_to_set.contains_key("ns/a"));
        assert!(plan.project_tasks_to_set.contains_key("ns/shop"));
        assert!(plan.records_to_delete.is_empty());
    }

    #[test]
    fn test_up_to_date_cache_yields_empty_plan() {
        let current = record("ns", "a", 1);
        let mut cached = CacheSnapshot::default();
        cached
            .records
            .insert("ns/a".to_string(), encode(&current).unwrap());
        cached
            .release_tasks
            .insert("ns/a".to_string(), TaskPointer::new("ns", "a"));

        let plan = SyncPlan::build(vec![current], &[], &cached).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_cache_only_entries_become_candidates() {
        let mut cached = CacheSnapshot::default();
        cached.records.insert("ns/gone".to_string(), "{}".to_string());
        let pointer = TaskPointer::new("ns", "gone").with_signature(TaskSignature {
            name: "Create-Release-Task".to_string(),
            uuid: "u1".to_string(),
            ..Default::default()
        });
        cached.release_tasks.insert("ns/gone".to_string(), pointer.clone());
        cached
            .project_tasks
            .insert("ns/old".to_string(), TaskPointer::new("ns", "old"));

        let plan = SyncPlan::build(Vec::new(), &[], &cached).unwrap();
        assert_eq!(plan.records_to_delete, vec!["ns/gone".to_string()]);
        assert_eq!(plan.stale_release_tasks, vec![pointer]);
        assert_eq!(plan.stale_project_tasks.len(), 1);
    }
}
