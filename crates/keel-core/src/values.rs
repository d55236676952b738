//! Chart value merging and request reuse on upgrade

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::{Result, ValidationError};
use crate::models::release::Values;
use crate::models::{ReleaseInfo, ReleasePlugin, ReleaseRequest};

/// Recursively merge `src` into `dest`.
///
/// Objects present on both sides are merged key by key; any other value in
/// `src` replaces the one in `dest`. With `delete_key`, a `null` in `src`
/// removes the key from `dest` instead.
pub fn merge_values(dest: &mut Values, src: &Values, delete_key: bool) {
    for (key, value) in src {
        if delete_key && value.is_null() {
            dest.remove(key);
            continue;
        }
        if let Value::Object(src_map) = value {
            if let Some(Value::Object(dest_map)) = dest.get_mut(key) {
                merge_values(dest_map, src_map, delete_key);
                continue;
            }
        }
        dest.insert(key.clone(), value.clone());
    }
}

/// Overlay `updates` on `base`: later write wins, an empty value removes the key
pub fn merge_string_map(
    base: &BTreeMap<String, String>,
    updates: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in updates {
        if value.is_empty() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Request plugins override prior plugins with the same name
pub fn merge_plugins(
    requested: &[ReleasePlugin],
    prior: &[ReleasePlugin],
) -> Result<Vec<ReleasePlugin>> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(requested.len() + prior.len());
    for plugin in requested {
        if !seen.insert(plugin.name.as_str()) {
            return Err(ValidationError::DuplicatePlugin(plugin.name.clone()).into());
        }
        merged.push(plugin.clone());
    }
    for plugin in prior {
        if seen.insert(plugin.name.as_str()) {
            merged.push(plugin.clone());
        }
    }
    Ok(merged)
}

/// Merge an upgrade request with the release it replaces
pub fn reuse_release_request(prior: &ReleaseInfo, request: &ReleaseRequest) -> Result<ReleaseRequest> {
    let mut config_values = Values::new();
    merge_values(&mut config_values, &prior.spec.config_values, false);
    merge_values(&mut config_values, &request.config_values, false);

    Ok(ReleaseRequest {
        config_values,
        dependencies: merge_string_map(&prior.spec.dependencies, &request.dependencies),
        labels: merge_string_map(&prior.labels, &request.labels),
        plugins: merge_plugins(&request.plugins, &prior.plugins)?,
        ..request.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Values {
        match v {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_merge_values_recurses_into_objects() {
        let mut dest = values(json!({"image": {"tag": "1", "repo": "x"}, "replicas": 1}));
        let src = values(json!({"image": {"tag": "2"}, "replicas": 3}));
        merge_values(&mut dest, &src, false);
        assert_eq!(
            Value::Object(dest),
            json!({"image": {"tag": "2", "repo": "x"}, "replicas": 3})
        );
    }

    #[test]
    fn test_merge_values_null_deletes_only_with_flag() {
        let src = values(json!({"replicas": null}));

        let mut keep = values(json!({"replicas": 1}));
        merge_values(&mut keep, &src, false);
        assert_eq!(keep["replicas"], Value::Null);

        let mut drop = values(json!({"replicas": 1}));
        merge_values(&mut drop, &src, true);
        assert!(!drop.contains_key("replicas"));
    }

    #[test]
    fn test_merge_string_map_empty_removes() {
        let mut base = BTreeMap::new();
        base.insert("redis".to_string(), "cache".to_string());
        base.insert("mysql".to_string(), "db".to_string());
        let mut updates = BTreeMap::new();
        updates.insert("redis".to_string(), String::new());
        updates.insert("kafka".to_string(), "queue".to_string());

        let merged = merge_string_map(&base, &updates);
        assert!(!merged.contains_key("redis"));
        assert_eq!(merged["mysql"], "db");
        assert_eq!(merged["kafka"], "queue");
    }

    #[test]
    fn test_merge_plugins_rejects_duplicates() {
        let plugin = ReleasePlugin::pause();
        let err = merge_plugins(&[plugin.clone(), plugin], &[]).unwrap_err();
        assert_eq!(err.to_string(), "more than one plugin pause-release is not allowed");
    }

    #[test]
    fn test_reuse_release_request_keeps_prior_settings() {
        let mut prior = ReleaseInfo::default();
        prior.spec.name = "web".to_string();
        prior.spec.config_values = values(json!({"replicas": 1, "image": {"tag": "1"}}));
        prior.spec.dependencies.insert("redis".to_string(), "cache".to_string());
        prior.labels.insert("tier".to_string(), "web".to_string());
        prior.plugins.push(ReleasePlugin {
            name: "label-pod".to_string(),
            ..Default::default()
        });

        let request = ReleaseRequest::new("web", "nginx")
            .with_value("image", json!({"tag": "2"}))
            .with_dependency("redis", "")
            .with_label("owner", "ops");

        let merged = reuse_release_request(&prior, &request).unwrap();
        assert_eq!(
            Value::Object(merged.config_values),
            json!({"replicas": 1, "image": {"tag": "2"}})
        );
        assert!(merged.dependencies.is_empty());
        assert_eq!(merged.labels.len(), 2);
        assert_eq!(merged.plugins.len(), 1);
        assert_eq!(merged.chart_name, "nginx");
    }
}
