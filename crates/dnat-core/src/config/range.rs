//! NAT range (synthetic address pool) parsing

use crate::error::{Error, Result};
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Pool of logical addresses handed out by the dynamic table
///
/// Parsed from CIDR notation. The address written in the CIDR is the first
/// one allocated, so `10.64.0.9/16` starts at `10.64.0.9` and wraps back to
/// `10.64.0.0` after `10.64.255.255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatRange {
    net: Ipv4Net,
}

impl NatRange {
    /// Create from an already-parsed network
    pub fn new(net: Ipv4Net) -> Self {
        Self { net }
    }

    /// First address handed out
    pub fn start(&self) -> Ipv4Addr {
        self.net.addr()
    }

    /// Lowest address of the range (wraparound target)
    pub fn min(&self) -> Ipv4Addr {
        self.net.network()
    }

    /// Highest address of the range
    pub fn max(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    /// Whether `addr` belongs to the pool
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.net.contains(&addr)
    }

    /// Number of addresses in the pool
    pub fn size(&self) -> u64 {
        u64::from(u32::from(self.max())) - u64::from(u32::from(self.min())) + 1
    }
}

impl FromStr for NatRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let net = s.trim().parse::<Ipv4Net>().map_err(|e| Error::InvalidRange {
            range: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(net))
    }
}

impl fmt::Display for NatRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}
