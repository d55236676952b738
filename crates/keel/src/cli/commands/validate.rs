//! Validate command

use std::path::PathBuf;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use keel_core::config::{load_config_from_dir, Config};

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Load and validate the keel configuration
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Fail on catalog warnings too
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    valid: bool,
    config_path: Option<PathBuf>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidateCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(strict = self.strict, "executing validate command");
        let cwd = std::env::current_dir()?;

        let mut report = Report::default();
        match load_config_from_dir(&cwd) {
            Ok((config, path)) => {
                report.config_path = Some(path);
                report.warnings = catalog_warnings(&config);
            }
            Err(e) => report.errors.push(format!("Configuration: {}", e)),
        }
        if self.strict {
            report.errors.append(&mut report.warnings);
        }
        report.valid = report.errors.is_empty();

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => print_report(&report, cli.quiet),
        }

        if !report.valid {
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
        Ok(())
    }
}

/// Gaps in the chart catalog that would make `keel plan` miss dependencies
fn catalog_warnings(config: &Config) -> Vec<String> {
    if config.charts.is_empty() {
        return vec!["No charts in the catalog, `keel plan` cannot wire dependencies".to_string()];
    }
    config
        .charts
        .iter()
        .flat_map(move |chart| {
            chart
                .dependencies
                .iter()
                .filter(move |dep| !config.charts.iter().any(|c| &c.name == *dep))
                .map(move |dep| {
                    format!(
                        "Chart '{}' depends on '{}', which is not in the catalog",
                        chart.name, dep
                    )
                })
        })
        .collect()
}

fn print_report(report: &Report, quiet: bool) {
    if !quiet {
        println!("{}", output::header("Validation Results"));
        if let Some(path) = &report.config_path {
            println!("Config: {}", style(path.display()).cyan());
        }
        for warning in &report.warnings {
            output::warning(warning);
        }
    }
    for error in &report.errors {
        output::error(error);
    }
    if report.valid && !quiet {
        output::success("Configuration is valid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::config::ChartEntry;

    fn chart(name: &str, deps: &[&str]) -> ChartEntry {
        ChartEntry {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_catalog_warns() {
        let warnings = catalog_warnings(&Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("No charts"));
    }

    #[test]
    fn test_dangling_dependency_warns() {
        let config = Config {
            charts: vec![chart("web", &["redis", "mysql"]), chart("mysql", &[])],
            ..Default::default()
        };
        assert_eq!(
            catalog_warnings(&config),
            vec!["Chart 'web' depends on 'redis', which is not in the catalog".to_string()]
        );
    }
}
