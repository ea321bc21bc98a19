//! dnat CLI
//!
//! Command-line interface for the DNS-driven and static DNAT redirector.

mod args;
mod commands;
mod logging;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use dnat_core::config::Config;
use std::process::ExitCode;
use tracing::error;

use args::Args;
use commands::Command;

fn main() -> ExitCode {
    // Usage errors exit 1, help and version exit 0
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    let config = load_config(&args);
    let directive = config.as_ref().ok().and_then(|c| c.logging.level.clone());

    // Initialize logging
    let _guard = match logging::init(&args, directive.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Fatal error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = config.and_then(|config| run(args, &config));

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match args.config.clone().or_else(commands::config::find_config_file) {
        Some(path) => path,
        None => return Ok(Config::default()),
    };

    let config = Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn run(args: Args, config: &Config) -> Result<()> {
    match args.command {
        Command::Dynamic(dynamic_args) => commands::dynamic::execute(dynamic_args, config),
        Command::Static(static_args) => commands::static_map::execute(static_args, config),
        Command::Config(config_args) => commands::config::execute(config_args, config),
        Command::Completions(comp_args) => commands::completions::execute(comp_args),
    }
}
