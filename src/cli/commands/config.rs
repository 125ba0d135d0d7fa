//! Config CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all overrides
    Show,
    /// Check a configuration file without using it
    Validate {
        /// File to check
        file: PathBuf,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("Failed to render configuration: {e}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        match &self.error {
            None => format!("{} is valid.", self.file),
            Some(error) => format!("{} is invalid: {error}", self.file),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            output(&ConfigShowOutput { config: config.clone() }, json_mode);
        }
        ConfigCommands::Validate { file } => {
            if !file.exists() {
                anyhow::bail!("Configuration file not found: {}", file.display());
            }
            let result = ConfigLoader::load_from_file(&file)
                .with_context(|| format!("Failed to load {}", file.display()));
            let out = ConfigValidateOutput {
                valid: result.is_ok(),
                file: file.display().to_string(),
                error: result.err().map(|e| format!("{e:#}")),
            };
            output(&out, json_mode);
            if !out.valid {
                anyhow::bail!("Configuration is invalid");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_show_renders_yaml_and_json() {
        let out = ConfigShowOutput { config: Config::default() };
        assert!(out.to_human().contains("token_budget"));
        assert!(out.to_json()["memory"]["hot_turns"].is_number());
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "memory:\n  hot_turns: 0").unwrap();
        let args = ConfigArgs {
            command: ConfigCommands::Validate { file: file.path().to_path_buf() },
        };
        assert!(execute(args, &Config::default(), true).await.is_err());
    }
}
