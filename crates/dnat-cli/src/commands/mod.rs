//! CLI commands

pub mod completions;
pub mod config;
pub mod dynamic;
pub mod static_map;

use clap::Subcommand;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite DNS answers to synthetic addresses and redirect their traffic
    Dynamic(dynamic::DynamicArgs),

    /// Redirect addresses listed in a mapping file, reloading it on change
    Static(static_map::StaticArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}
