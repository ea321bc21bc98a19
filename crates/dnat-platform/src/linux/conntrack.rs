//! Connection-tracking injection through `conntrack(8)`

use super::tool::{args, Tool};
use dnat_core::packet::{ClassifiedPacket, Protocol, Transport};
use dnat_core::redirect::ConntrackInjector;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Queries and creates conntrack entries with the `conntrack` tool
#[derive(Debug, Clone)]
pub struct ConntrackTool {
    tool: Tool,
}

impl ConntrackTool {
    /// Use `conntrack` from `PATH`
    pub fn new() -> Self {
        Self::with_tool(Tool::CONNTRACK)
    }

    /// Use a specific program
    pub fn with_tool(tool: Tool) -> Self {
        Self { tool }
    }
}

impl Default for ConntrackTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConntrackInjector for ConntrackTool {
    fn exists(&self, flow: &ClassifiedPacket) -> dnat_core::Result<bool> {
        // A miss exits non-zero with "0 flow entries"
        let output = self.tool.output(&get_args(flow))?;
        Ok(output.status.success())
    }

    fn create(&self, flow: &ClassifiedPacket, real: Ipv4Addr, timeout: Duration) -> dnat_core::Result<()> {
        self.tool.run(&create_args(flow, real, timeout))?;
        Ok(())
    }
}

/// Original-direction tuple selectors shared by query and create
fn tuple_args(flow: &ClassifiedPacket) -> Vec<String> {
    let mut out = args!["-s", flow.src_addr, "-d", flow.dst_addr];
    match (flow.protocol, flow.transport) {
        (Protocol::Tcp | Protocol::Udp, Transport::Ports { src, dst }) => {
            out.extend(args!["-p", protocol_name(flow.protocol), "--sport", src, "--dport", dst]);
        }
        (Protocol::Icmp, Transport::Icmp { icmp_type, code, echo_id }) => {
            out.extend(args!["-p", "icmp", "--icmp-type", icmp_type, "--icmp-code", code]);
            if let Some(id) = echo_id {
                out.extend(args!["--icmp-id", id]);
            }
        }
        (proto, _) => out.extend(args!["-p", proto.to_u8()]),
    }
    out
}

fn protocol_name(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
        Protocol::Icmp => "icmp",
        Protocol::Other(_) => "",
    }
}

pub(crate) fn get_args(flow: &ClassifiedPacket) -> Vec<String> {
    let mut out = args!["-G"];
    out.extend(tuple_args(flow));
    out
}

pub(crate) fn create_args(flow: &ClassifiedPacket, real: Ipv4Addr, timeout: Duration) -> Vec<String> {
    let mut out = args!["-I"];
    out.extend(tuple_args(flow));
    if flow.protocol == Protocol::Tcp {
        out.extend(args!["--state", "ESTABLISHED"]);
    }
    out.extend(args!["--timeout", timeout.as_secs(), "--dst-nat", real]);
    out
}
