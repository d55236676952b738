//! Default configuration values

use super::types::Config;

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "keel.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "keel.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".keel.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".keel.toml",
    ]
}

/// Generate default configuration YAML
pub fn default_config_yaml() -> String {
    let config = Config::default();
    serde_yaml::to_string(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# keel configuration

tasks:
  worker_concurrency: 100
  default_queue: keel_tasks
  results_expire_in_sec: 3600
  poll_interval_sec: 1

release:
  default_timeout_sec: 300
  retry_times: 5
  retry_interval_sec: 2

project:
  default_timeout_sec: 600

sync:
  resync_interval_sec: 300
  tx_retry_delay_sec: 5

cache:
  releases_key: keel-releases
  release_tasks_key: keel-release-tasks
  projects_key: keel-project-tasks

charts: []
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.tasks.worker_concurrency, defaults.tasks.worker_concurrency);
        assert_eq!(parsed.release.default_timeout_sec, 300);
        assert_eq!(parsed.project.default_timeout_sec, 600);
        assert_eq!(parsed.cache.projects_key, defaults.cache.projects_key);
    }

    #[test]
    fn test_default_yaml_round_trips() {
        let parsed: Config = serde_yaml::from_str(&default_config_yaml()).unwrap();
        assert_eq!(parsed.sync.resync_interval_sec, 300);
    }
}
