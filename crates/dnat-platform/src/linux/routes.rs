//! Kernel routing through `ip route`

use super::tool::{args, Tool};
use crate::{PlatformError, Result};
use dnat_core::routes::{RouteBackend, RouteSession, RouteTarget};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::path::Path;

const ROUTE_TYPES: &[&str] = &[
    "unicast", "local", "broadcast", "multicast", "throw", "unreachable", "prohibit", "blackhole", "nat",
];

/// Route backend driving iproute2
#[derive(Debug, Clone)]
pub struct IpRouteBackend {
    tool: Tool,
}

impl IpRouteBackend {
    /// Backend for `interface`, which must exist
    pub fn new(interface: &str) -> Result<Self> {
        if !Path::new("/sys/class/net").join(interface).exists() {
            return Err(PlatformError::InterfaceNotFound(interface.to_string()));
        }
        Ok(Self::with_tool(Tool::IP))
    }

    /// Use a specific program, skipping the interface check
    pub fn with_tool(tool: Tool) -> Self {
        Self { tool }
    }
}

impl RouteBackend for IpRouteBackend {
    fn open(&self, target: &RouteTarget) -> dnat_core::Result<Box<dyn RouteSession>> {
        Ok(Box::new(IpRouteSession {
            tool: self.tool,
            target: target.clone(),
        }))
    }
}

struct IpRouteSession {
    tool: Tool,
    target: RouteTarget,
}

impl IpRouteSession {
    fn selector(&self) -> Vec<String> {
        args!["table", self.target.table, "proto", self.target.protocol]
    }
}

impl RouteSession for IpRouteSession {
    fn dump(&mut self) -> dnat_core::Result<Vec<Ipv4Net>> {
        let mut cmd = args!["-4", "route", "show"];
        cmd.extend(self.selector());
        let listing = self.tool.run(&cmd)?;
        Ok(parse_route_dump(&listing))
    }

    fn delete(&mut self, route: &Ipv4Net) -> dnat_core::Result<()> {
        let mut cmd = args!["-4", "route", "del", route];
        cmd.extend(self.selector());
        self.tool.run(&cmd)?;
        Ok(())
    }

    fn add_host(&mut self, dst: Ipv4Addr) -> dnat_core::Result<()> {
        let mut cmd = args!["-4", "route", "add", format!("{dst}/32"), "dev", self.target.interface];
        cmd.extend(self.selector());
        cmd.extend(args!["scope", "link"]);
        self.tool.run(&cmd)?;
        Ok(())
    }
}

/// Extract destinations from `ip route show` output
pub(crate) fn parse_route_dump(listing: &str) -> Vec<Ipv4Net> {
    listing
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace().peekable();
            if words.peek().is_some_and(|w| ROUTE_TYPES.contains(w)) {
                words.next();
            }
            match words.next()? {
                "default" => Some(Ipv4Net::default()),
                dst if dst.contains('/') => dst.parse().ok(),
                dst => dst.parse::<Ipv4Addr>().ok().and_then(|a| Ipv4Net::new(a, 32).ok()),
            }
        })
        .collect()
}
