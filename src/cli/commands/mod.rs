//! CLI command implementations.

pub mod case;
pub mod config;
pub mod replay;
