//! Configuration validation

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_timeouts(config)?;
    validate_sync(config)?;
    validate_cache(config)?;
    validate_charts(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> crate::error::KeelError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
    .into()
}

fn validate_tasks(config: &Config) -> Result<()> {
    if config.tasks.worker_concurrency == 0 {
        return Err(invalid("tasks.worker_concurrency", "must be at least 1"));
    }
    if config.tasks.poll_interval_sec == 0 {
        return Err(invalid("tasks.poll_interval_sec", "must be at least 1"));
    }
    if config.tasks.default_queue.is_empty() {
        return Err(invalid("tasks.default_queue", "queue name cannot be empty"));
    }
    Ok(())
}

fn validate_timeouts(config: &Config) -> Result<()> {
    if config.release.default_timeout_sec <= 0 {
        return Err(invalid("release.default_timeout_sec", "must be positive"));
    }
    if config.project.default_timeout_sec <= 0 {
        return Err(invalid("project.default_timeout_sec", "must be positive"));
    }
    Ok(())
}

fn validate_sync(config: &Config) -> Result<()> {
    if config.sync.resync_interval_sec == 0 {
        return Err(invalid("sync.resync_interval_sec", "must be at least 1"));
    }
    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    let keys = [
        ("cache.releases_key", &config.cache.releases_key),
        ("cache.release_tasks_key", &config.cache.release_tasks_key),
        ("cache.projects_key", &config.cache.projects_key),
    ];
    for (field, value) in keys {
        if value.is_empty() {
            return Err(invalid(field, "collection name cannot be empty"));
        }
    }
    Ok(())
}

fn validate_charts(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for (i, chart) in config.charts.iter().enumerate() {
        if chart.name.is_empty() {
            return Err(invalid(format!("charts[{}].name", i), "chart name cannot be empty"));
        }
        if !seen.insert(chart.name.as_str()) {
            return Err(invalid(
                format!("charts[{}].name", i),
                format!("duplicate chart {}", chart.name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChartEntry;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_resync_interval() {
        let mut config = Config::default();
        config.sync.resync_interval_sec = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sync.resync_interval_sec"));
    }

    #[test]
    fn test_validate_empty_collection_name() {
        let mut config = Config::default();
        config.cache.release_tasks_key.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_chart() {
        let mut config = Config::default();
        let entry = ChartEntry {
            name: "redis".to_string(),
            ..Default::default()
        };
        config.charts = vec![entry.clone(), entry];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate chart redis"));
    }
}
