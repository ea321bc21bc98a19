//! Configuration management for dnat
//!
//! Operating parameters come from the command line (queue number, NAT range,
//! mapping file, ...). The tunables that rarely change live in an optional
//! TOML file with the same strongly-typed, defaulted layout for every section.

mod range;

pub use range::NatRange;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Kernel redirection settings
    pub nat: NatConfig,

    /// DNS rewrite server settings
    pub dns: DnsConfig,

    /// Static table reload settings
    pub reload: ReloadConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.nat.conntrack_timeout_secs == 0 {
            return Err(Error::config_value(
                "nat.conntrack_timeout_secs",
                "Must be greater than zero",
            ));
        }

        // Kernel route protocol 0 is "unspec" and 1..=4 belong to the kernel itself
        if self.nat.route_protocol <= 4 {
            return Err(Error::config_value(
                "nat.route_protocol",
                "Must be above the kernel-reserved range (5-255)",
            ));
        }

        if self.dns.upstream_port == 0 {
            return Err(Error::config_value("dns.upstream_port", "Must be between 1 and 65535"));
        }

        if self.dns.upstream_timeout_ms == 0 {
            return Err(Error::config_value(
                "dns.upstream_timeout_ms",
                "Must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Kernel redirection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NatConfig {
    /// Idle timeout of injected connection-tracking entries
    pub conntrack_timeout_secs: u32,
    /// Route protocol number tagging the routes this process owns
    pub route_protocol: u8,
}

impl NatConfig {
    /// Idle timeout as a `Duration`
    pub fn conntrack_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.conntrack_timeout_secs))
    }
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            conntrack_timeout_secs: 120,
            route_protocol: 67,
        }
    }
}

/// DNS rewrite server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DnsConfig {
    /// Address the rewrite server listens on
    pub listen_addr: Ipv4Addr,
    /// Port of the upstream resolver
    pub upstream_port: u16,
    /// Upstream query timeout in milliseconds
    pub upstream_timeout_ms: u64,
}

impl DnsConfig {
    /// Upstream timeout as a `Duration`
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: Ipv4Addr::LOCALHOST,
            upstream_port: 53,
            upstream_timeout_ms: 2000,
        }
    }
}

/// Static table reload configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Delay before re-establishing a watch on a replaced file
    pub settle_delay_ms: u64,
}

impl ReloadConfig {
    /// Settle delay as a `Duration`
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self { settle_delay_ms: 100 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. "info", "dnat_core=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}
