//! Faultline CLI entry point.

use clap::Parser;

use faultline::cli::{Cli, Commands};
use faultline::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match faultline::cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => faultline::cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => faultline::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Case(args) => faultline::cli::commands::case::execute(args, &config, cli.json).await,
        Commands::Replay(args) => faultline::cli::commands::replay::execute(args, &config, cli.json).await,
        Commands::Config(args) => faultline::cli::commands::config::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        faultline::cli::handle_error(err, cli.json);
    }
}
