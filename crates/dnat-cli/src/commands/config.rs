//! Config command - tunables file management

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use dnat_core::config::Config;
use std::path::{Path, PathBuf};
use tracing::info;

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Config file to show instead
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with the defaults
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "dnat.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },

    /// Show config file locations
    Paths,
}

/// Execute config command against the already loaded configuration
pub fn execute(args: ConfigArgs, effective: &Config) -> Result<()> {
    match args.action {
        ConfigAction::Show { file } => show_config(file.as_deref(), effective),
        ConfigAction::Generate { output, force } => generate_config(&output, force),
        ConfigAction::Validate { file } => validate_config(&file),
        ConfigAction::Paths => show_paths(),
    }
}

fn show_config(file: Option<&Path>, effective: &Config) -> Result<()> {
    let loaded;
    let config = match file {
        Some(path) => {
            loaded = Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?;
            &loaded
        }
        None => effective,
    };

    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{}", toml_str);
    Ok(())
}

fn generate_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let toml_str = Config::default().to_toml().context("Failed to serialize config")?;

    let content = format!(
        "# dnat tunables\n\
         # Every key is optional; removed keys fall back to the values below.\n\
         #\n\
         # [nat]    conntrack_timeout_secs: idle timeout of injected entries\n\
         #          route_protocol: marks the host routes managed in static mode\n\
         # [dns]    listen_addr, upstream_port, upstream_timeout_ms\n\
         # [reload] settle_delay_ms: wait before re-watching a replaced mapping file\n\
         # [logging] level = \"info\" sets the default filter when no -v/-q is given\n\n\
         {}",
        toml_str
    );

    std::fs::write(output, content).with_context(|| format!("Failed to write config to {}", output.display()))?;

    info!("Generated config file: {}", output.display());
    println!("Configuration file generated: {}", output.display());
    Ok(())
}

fn validate_config(file: &Path) -> Result<()> {
    let config = Config::load(file).with_context(|| format!("Failed to load config from {}", file.display()))?;

    config.validate().context("Configuration validation failed")?;

    println!("{} Configuration is valid", "✓".green());
    println!("  Conntrack timeout: {}s", config.nat.conntrack_timeout_secs);
    println!("  Route protocol: {}", config.nat.route_protocol);
    println!("  DNS listen address: {}", config.dns.listen_addr);
    println!(
        "  Upstream: port {}, timeout {}ms",
        config.dns.upstream_port, config.dns.upstream_timeout_ms
    );
    Ok(())
}

fn show_paths() -> Result<()> {
    println!("Configuration file search paths:");
    println!();
    for (index, path) in search_paths().iter().enumerate() {
        let marker = if path.exists() { " (found)".green().to_string() } else { String::new() };
        println!("  {}. {}{}", index + 1, path.display(), marker);
    }
    Ok(())
}

/// Candidate tunables files, in priority order
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("dnat.toml")];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "dnat") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/dnat/config.toml"));
    paths
}

/// First existing tunables file, if any
pub fn find_config_file() -> Option<PathBuf> {
    search_paths().into_iter().find(|path| path.exists())
}
