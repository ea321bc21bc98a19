//! Command-line argument parsing

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::commands::Command;

/// dnat - DNS-driven and static destination NAT
///
/// Redirects traffic sent to synthetic or mapped addresses toward their real
/// destinations by injecting connection-tracking entries from an NFQUEUE.
#[derive(Parser, Debug)]
#[command(name = "dnat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Queue only new flows, e.g.:\n  iptables -t raw -A PREROUTING -d 10.64.0.0/16 -m conntrack --ctstate NEW -j NFQUEUE --queue-num 0")]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Tunables file (TOML)
    #[arg(short = 'c', long, value_name = "FILE", global = true, env = "DNAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format for logs
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Log file path
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Run in quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// Compact format
    Compact,
}
