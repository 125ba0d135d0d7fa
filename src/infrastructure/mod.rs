//! Infrastructure layer module
//!
//! Ambient concerns shared by the engine and the CLI:
//! - Configuration management (figment, YAML + environment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
