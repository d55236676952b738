//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// On-disk configuration syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML; everything else is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }

    /// Parse and validate configuration text
    pub fn parse(self, content: &str) -> Result<Config> {
        let config: Config = match self {
            Self::Toml => toml::from_str(content).map_err(ConfigError::TomlError)?,
            Self::Yaml => serde_yaml::from_str(content).map_err(ConfigError::YamlError)?,
        };
        validate_config(&config)?;
        Ok(config)
    }
}

/// Read, parse, and validate one configuration file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = ConfigFormat::from_path(path);
    info!(path = %path.display(), format = ?format, "loading config");
    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = format.parse(&content)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Nearest configuration file, checking `start_dir` first and then each parent
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let found = start_dir.ancestors().find_map(|dir| {
        config_file_names()
            .into_iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    });
    match &found {
        Some(path) => debug!(path = %path.display(), "found config file"),
        None => debug!(start_dir = %start_dir.display(), "no config file found"),
    }
    found
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "no usable config found, using defaults");
            (Config::default(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.yaml");
        std::fs::write(&config_path, "tasks:\n  worker_concurrency: 4\n").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_walks_up() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.toml");
        std::fs::write(&config_path, "[tasks]\nworker_concurrency = 4\n").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_load_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.toml");
        std::fs::write(
            &config_path,
            "[release]\ndefault_timeout_sec = 120\n\n[sync]\nresync_interval_sec = 60\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.release.default_timeout_sec, 120);
        assert_eq!(config.release.retry_times, 5);
        assert_eq!(config.sync.resync_interval_sec, 60);
    }

    #[test]
    fn test_load_config_yaml_with_catalog() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.yaml");
        std::fs::write(
            &config_path,
            "charts:\n  - name: app\n    dependencies: [redis]\n  - name: redis\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.charts.len(), 2);
        assert_eq!(config.charts[0].dependencies, vec!["redis"]);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("keel.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new(".keel.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("keel")), ConfigFormat::Yaml);
        assert!(ConfigFormat::Yaml.parse("tasks: [").is_err());
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("keel.yaml");
        std::fs::write(&config_path, "tasks:\n  worker_concurrency: 0\n").unwrap();

        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path());
        assert!(path.is_none());
        assert_eq!(config.tasks.worker_concurrency, 100);
    }
}
