//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::case::CaseArgs;
use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::replay::ReplayArgs;

#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(about = "Faultline - investigation orchestration for AI-assisted troubleshooting", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .faultline/
    #[arg(short, long, global = true, env = "FAULTLINE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open, inspect and advance investigation cases
    Case(CaseArgs),

    /// Run a scripted investigation in memory and print every turn plan
    Replay(ReplayArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),
}
