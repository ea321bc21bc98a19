//! Dynamic mode - DNS rewriting plus packet redirection

use anyhow::Result;
use clap::Args;
use dnat_core::config::{Config, NatRange};
use std::net::Ipv4Addr;

/// Dynamic mode arguments
#[derive(Args, Debug)]
pub struct DynamicArgs {
    /// NFQUEUE number receiving packets sent to the NAT range
    pub queue_num: u16,

    /// Pool of synthetic addresses, in CIDR notation
    #[arg(value_name = "NAT_CIDR")]
    pub nat_cidr: NatRange,

    /// ipset receiving every resolved real address
    pub ipset_name: String,

    /// Local port of the DNS rewrite server
    pub dns_port: u16,

    /// Upstream resolver
    pub upstream_dns_ip: Ipv4Addr,

    /// Firewall mark set on every accepted packet (decimal or 0x hex)
    #[arg(long, value_name = "MARK", value_parser = parse_mark)]
    pub fwmark: Option<u32>,
}

/// Execute dynamic mode
#[cfg(target_os = "linux")]
pub fn execute(args: DynamicArgs, config: &Config) -> Result<()> {
    use crate::supervisor::{install_signal_handler, Supervisor};
    use anyhow::Context;
    use dnat_core::dns::{DnsRewriteServer, DnsRewriter, UdpUpstream};
    use dnat_core::redirect::Redirector;
    use dnat_core::table::DynamicTable;
    use dnat_platform::{serve_queue, ConntrackTool, IpsetSink, NfQueue};
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tracing::info;

    info!(
        queue = args.queue_num,
        range = %args.nat_cidr,
        ipset = %args.ipset_name,
        upstream = %args.upstream_dns_ip,
        "Starting dynamic DNAT"
    );

    let table = Arc::new(DynamicTable::new(args.nat_cidr));

    let (sink, _ipset_writer) = IpsetSink::spawn(&args.ipset_name)
        .with_context(|| format!("Failed to set up ipset '{}'", args.ipset_name))?;

    let upstream = UdpUpstream::new(
        SocketAddr::new(args.upstream_dns_ip.into(), config.dns.upstream_port),
        config.dns.upstream_timeout(),
    );
    let rewriter = DnsRewriter::new(upstream, Arc::clone(&table), Arc::new(sink));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let listen = SocketAddr::new(config.dns.listen_addr.into(), args.dns_port);
    let server = runtime
        .block_on(DnsRewriteServer::bind(listen, rewriter))
        .with_context(|| format!("Failed to bind DNS server on {listen}"))?;

    let mut queue = NfQueue::open(args.queue_num)
        .with_context(|| format!("Failed to open NFQUEUE {}", args.queue_num))?;

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(Arc::clone(&running))?;

    let mut supervisor = Supervisor::new(running);
    supervisor.spawn("dns", move |_running: &AtomicBool| {
        runtime.block_on(server.run())?;
        Ok(())
    })?;

    let timeout = config.nat.conntrack_timeout();
    let mark = args.fwmark;
    supervisor.spawn("nfqueue", move |running: &AtomicBool| {
        let mut redirector = Redirector::new(table, ConntrackTool::new(), timeout);
        serve_queue(&mut queue, &mut redirector, mark, running)?;
        Ok(())
    })?;

    supervisor.wait()
}

/// Execute dynamic mode
#[cfg(not(target_os = "linux"))]
pub fn execute(_args: DynamicArgs, _config: &Config) -> Result<()> {
    anyhow::bail!("dynamic mode requires Linux netfilter")
}

/// Parse a firewall mark the way iptables accepts it
pub fn parse_mark(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid mark '{s}': {e}"))
}
