//! Init command

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use keel_core::config::{Config, DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML};

use crate::cli::{output, Cli, OutputFormat};

/// Write a default keel configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite an existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Write TOML instead of YAML
    #[arg(long)]
    pub toml: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, toml = self.toml, "executing init command");
        let cwd = std::env::current_dir()?;
        let path = self.write_config(&cwd)?;

        match cli.format {
            OutputFormat::Json => {
                let out = serde_json::json!({ "config_path": path.to_string_lossy() });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!("Created {}", path.display()));
                }
            }
        }
        Ok(())
    }

    fn write_config(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let default_name = if self.toml {
            DEFAULT_CONFIG_TOML
        } else {
            DEFAULT_CONFIG_YAML
        };
        let path = self.output.clone().unwrap_or_else(|| dir.join(default_name));
        if path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                path.display()
            );
        }

        let content = if self.toml {
            let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
            toml::to_string_pretty(&config)?
        } else {
            DEFAULT_CONFIG_TEMPLATE.to_string()
        };
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
