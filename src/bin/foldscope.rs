//! Foldscope CLI Binary
//!
//! Renders JSON documents through a headless notebook host.

use anyhow::Context;
use clap::Parser;
use foldscope::cli::{map_error, Cli, RunContext};
use foldscope::config::ConfigLoader;
use foldscope::error::ApiError;
use foldscope::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Foldscope CLI starting");

    match run(&cli) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:#}", e);
            match e.downcast_ref::<ApiError>() {
                Some(api_error) => eprintln!("{}", map_error(api_error)),
                None => eprintln!("{:#}", e),
            }
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .with_context(|| format!("loading configuration for {}", cli.workspace.display()))?;
    Ok(context.execute(&cli.command)?)
}

/// Build logging configuration from CLI args and config file
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = match cli.config {
        Some(ref config_path) => ConfigLoader::load_from_file(config_path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    // CLI arguments have the highest priority
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }

    config
}
