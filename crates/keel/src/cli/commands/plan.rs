//! Plan command

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use keel_core::config::load_config_or_default;
use keel_core::models::ProjectParams;
use keel_core::ChartCatalog;
use keel_project::auto_create_release_dependencies;

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Resolve a project file's release dependencies against the chart catalog
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Project file (YAML or JSON) with `releases` and optional `commonValues`
    pub file: PathBuf,
}

/// One release in install order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRelease {
    pub name: String,
    pub chart: String,
    pub dependencies: BTreeMap<String, String>,
}

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(file = %self.file.display(), "executing plan command");
        let cwd = std::env::current_dir()?;
        let (config, _) = load_config_or_default(&cwd);
        let catalog = ChartCatalog::new(&config.charts);

        let params = read_project_file(&self.file)?;
        let rt = tokio::runtime::Runtime::new()?;
        let planned = match rt.block_on(plan_releases(&catalog, params)) {
            Ok(planned) => planned,
            Err(e) => {
                output::error(&format!("Cannot plan {}: {}", self.file.display(), e));
                std::process::exit(exit_codes::VALIDATION_ERROR);
            }
        };

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&planned)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", output::header("Install order"));
                    for (index, release) in planned.iter().enumerate() {
                        println!(
                            "{:>3}. {} {}",
                            index + 1,
                            style(&release.name).green().bold(),
                            style(format!("({})", release.chart)).dim()
                        );
                        for (chart, target) in &release.dependencies {
                            println!("{}", output::key_value(chart, target));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn read_project_file(path: &Path) -> anyhow::Result<ProjectParams> {
    let content = std::fs::read_to_string(path)?;
    let params = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(params)
}

async fn plan_releases(
    catalog: &ChartCatalog,
    params: ProjectParams,
) -> anyhow::Result<Vec<PlannedRelease>> {
    if params.releases.is_empty() {
        anyhow::bail!("project file has no releases");
    }
    let ordered = auto_create_release_dependencies(catalog, params.releases).await?;
    Ok(ordered
        .into_iter()
        .map(|release| PlannedRelease {
            name: release.name,
            chart: release.chart_name,
            dependencies: release.dependencies,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::config::ChartEntry;
    use tempfile::TempDir;

    fn catalog() -> ChartCatalog {
        ChartCatalog::new(&[
            ChartEntry {
                name: "web".to_string(),
                dependencies: vec!["mysql".to_string()],
                ..Default::default()
            },
            ChartEntry {
                name: "mysql".to_string(),
                ..Default::default()
            },
        ])
    }

    #[tokio::test]
    async fn test_plan_orders_and_wires_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.yaml");
        std::fs::write(
            &path,
            "releases:\n  - name: frontend\n    chartName: web\n  - name: db\n    chartName: mysql\n",
        )
        .unwrap();

        let params = read_project_file(&path).unwrap();
        let planned = plan_releases(&catalog(), params).await.unwrap();
        assert_eq!(planned[0].name, "db");
        assert_eq!(planned[1].name, "frontend");
        assert_eq!(planned[1].dependencies["mysql"], "db");
    }

    #[tokio::test]
    async fn test_plan_reads_json_and_rejects_unknown_charts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.json");
        std::fs::write(&path, r#"{"releases":[{"name":"cache","chartName":"redis"}]}"#).unwrap();

        let params = read_project_file(&path).unwrap();
        assert!(plan_releases(&catalog(), params).await.is_err());
    }

    #[tokio::test]
    async fn test_plan_rejects_empty_project() {
        let err = plan_releases(&catalog(), ProjectParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no releases"));
    }
}
