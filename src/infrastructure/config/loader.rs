use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid hot_turns: {0}. Must be at least 1")]
    InvalidHotTurns(usize),

    #[error("Invalid token_budget: {0}. Must be at least 1")]
    InvalidTokenBudget(usize),

    #[error("Invalid validation_threshold: {0}. Must be in (0.0, 1.0]")]
    InvalidValidationThreshold(f64),

    #[error("Invalid dominance_margin: {0}. Must be positive")]
    InvalidDominanceMargin(f64),

    #[error("Invalid recency_weight: {0}. Cannot be negative")]
    InvalidRecencyWeight(f64),

    #[error("Invalid prior_weight: {0}. Must be positive")]
    InvalidPriorWeight(f64),

    #[error("Invalid history_capacity: {0}. Must be at least 1")]
    InvalidHistoryCapacity(usize),

    #[error("Invalid max_loops: {0}. Must be at least 1")]
    InvalidMaxLoops(usize),

    #[error("Invalid timeout_ms: {0}. Must be positive")]
    InvalidTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .faultline/config.yaml (project config)
    /// 3. .faultline/local.yaml (local overrides, optional)
    /// 4. Environment variables (FAULTLINE_* prefix, `__` between section and key)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".faultline/config.yaml"))
            .merge(Yaml::file(".faultline/local.yaml"))
            .merge(Env::prefixed("FAULTLINE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.memory.hot_turns == 0 {
            return Err(ConfigError::InvalidHotTurns(config.memory.hot_turns));
        }
        if config.memory.token_budget == 0 {
            return Err(ConfigError::InvalidTokenBudget(config.memory.token_budget));
        }

        let hypothesis = &config.hypothesis;
        let threshold = hypothesis.validation_threshold;
        if !(threshold > 0.0 && (0.0..=1.0).contains(&threshold)) {
            return Err(ConfigError::InvalidValidationThreshold(
                hypothesis.validation_threshold,
            ));
        }
        if !is_positive(hypothesis.dominance_margin) {
            return Err(ConfigError::InvalidDominanceMargin(hypothesis.dominance_margin));
        }
        if !(hypothesis.recency_weight.is_finite() && hypothesis.recency_weight >= 0.0) {
            return Err(ConfigError::InvalidRecencyWeight(hypothesis.recency_weight));
        }
        if !is_positive(hypothesis.prior_weight) {
            return Err(ConfigError::InvalidPriorWeight(hypothesis.prior_weight));
        }

        if config.phase.history_capacity == 0 {
            return Err(ConfigError::InvalidHistoryCapacity(config.phase.history_capacity));
        }
        if config.phase.max_loops == 0 {
            return Err(ConfigError::InvalidMaxLoops(config.phase.max_loops));
        }

        if config.turn.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(config.turn.timeout_ms));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
