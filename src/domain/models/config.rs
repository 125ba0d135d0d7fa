use serde::{Deserialize, Serialize};

/// Main configuration structure for Faultline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Memory tiering configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Hypothesis lifecycle configuration
    #[serde(default)]
    pub hypothesis: HypothesisConfig,

    /// Phase orchestration configuration
    #[serde(default)]
    pub phase: PhaseConfig,

    /// Intensity controller configuration
    #[serde(default)]
    pub intensity: IntensityConfig,

    /// Turn execution configuration
    #[serde(default)]
    pub turn: TurnConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Memory tiering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryConfig {
    /// Number of most recent turns always included verbatim
    #[serde(default = "default_hot_turns")]
    pub hot_turns: usize,

    /// Maximum number of similar older turns included
    #[serde(default = "default_warm_turns")]
    pub warm_turns: usize,

    /// Token budget for hot plus warm context
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

const fn default_hot_turns() -> usize {
    10
}

const fn default_warm_turns() -> usize {
    5
}

const fn default_token_budget() -> usize {
    8_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            hot_turns: default_hot_turns(),
            warm_turns: default_warm_turns(),
            token_budget: default_token_budget(),
        }
    }
}

/// Hypothesis lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HypothesisConfig {
    /// Confidence at which a testing hypothesis is validated (0.0-1.0)
    #[serde(default = "default_validation_threshold")]
    pub validation_threshold: f64,

    /// Weighted contradiction surplus over support that rejects a hypothesis
    #[serde(default = "default_dominance_margin")]
    pub dominance_margin: f64,

    /// How strongly newer evidence outweighs older evidence
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Pseudo-evidence weight that keeps a single observation from reaching
    /// full confidence
    #[serde(default = "default_prior_weight")]
    pub prior_weight: f64,
}

const fn default_validation_threshold() -> f64 {
    0.75
}

const fn default_dominance_margin() -> f64 {
    1.0
}

const fn default_recency_weight() -> f64 {
    0.25
}

const fn default_prior_weight() -> f64 {
    1.0
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            validation_threshold: default_validation_threshold(),
            dominance_margin: default_dominance_margin(),
            recency_weight: default_recency_weight(),
            prior_weight: default_prior_weight(),
        }
    }
}

/// Phase orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PhaseConfig {
    /// Capacity of the phase history ring
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Occurrences of one phase in the ring above which a loop is reported
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,
}

const fn default_history_capacity() -> usize {
    10
}

const fn default_max_loops() -> usize {
    3
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            max_loops: default_max_loops(),
        }
    }
}

/// Intensity controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IntensityConfig {
    /// Turns in one phase after which effort rises to medium
    #[serde(default = "default_dwell_turns")]
    pub dwell_turns: u32,

    /// Distinct evidence references above which a case counts as large
    #[serde(default = "default_large_case_threshold")]
    pub large_case_threshold: u64,
}

const fn default_dwell_turns() -> u32 {
    2
}

const fn default_large_case_threshold() -> u64 {
    50
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            dwell_turns: default_dwell_turns(),
            large_case_threshold: default_large_case_threshold(),
        }
    }
}

/// Turn execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TurnConfig {
    /// Timeout for one full turn in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".faultline/faultline.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}
