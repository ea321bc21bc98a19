//! Packet redirection
//!
//! Turns one classified packet addressed to a logical destination into a
//! kernel connection-tracking entry that rewrites the flow towards the real
//! destination. The packet itself is never modified; the queue verdict is
//! always accept.

use crate::error::Result;
use crate::packet::{ClassifiedPacket, Endpoint, Protocol, Transport};
use crate::table::AddressTable;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Kernel connection-tracking access used by the redirector
///
/// Each call may spawn a `conntrack` process, so the queued traffic should be
/// limited to the first packet of a flow. Feed the NFQUEUE from a rule such as
/// `iptables -t raw -A PREROUTING -d 10.64.0.0/16 -m conntrack --ctstate NEW -j NFQUEUE --queue-num 0`
/// (or `-t mangle` when the raw table lacks conntrack state). Packets of an
/// already tracked flow then never reach the queue.
#[cfg_attr(test, mockall::automock)]
pub trait ConntrackInjector: Send {
    /// Whether the kernel already tracks this flow
    fn exists(&self, flow: &ClassifiedPacket) -> Result<bool>;

    /// Install an entry for `flow` that translates its destination to `real`
    ///
    /// TCP entries are created in the ESTABLISHED state. `timeout` is the
    /// idle timeout of the new entry.
    fn create(&self, flow: &ClassifiedPacket, real: Ipv4Addr, timeout: Duration) -> Result<()>;
}

/// Result of handling one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Destination is outside the logical address space
    NotManaged,
    /// Logical destination without a mapping
    Miss,
    /// The kernel already tracks the flow
    AlreadyTracked(Ipv4Addr),
    /// A new redirection entry was installed
    Installed(Ipv4Addr),
    /// The injector failed; the packet still passes
    Failed(Ipv4Addr),
}

/// Per-outcome counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedirectStats {
    /// Total packets handled
    pub packets: u64,
    /// Packets to unmanaged destinations
    pub not_managed: u64,
    /// Lookup misses
    pub misses: u64,
    /// Flows already tracked by the kernel
    pub already_tracked: u64,
    /// Redirections installed
    pub installed: u64,
    /// Injector failures
    pub failed: u64,
}

impl RedirectStats {
    fn record(&mut self, outcome: RedirectOutcome) {
        self.packets += 1;
        match outcome {
            RedirectOutcome::NotManaged => self.not_managed += 1,
            RedirectOutcome::Miss => self.misses += 1,
            RedirectOutcome::AlreadyTracked(_) => self.already_tracked += 1,
            RedirectOutcome::Installed(_) => self.installed += 1,
            RedirectOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Looks up queued packets and installs kernel redirections
pub struct Redirector<T: ?Sized, C> {
    table: Arc<T>,
    injector: C,
    timeout: Duration,
    stats: RedirectStats,
}

impl<T, C> Redirector<T, C>
where
    T: AddressTable + ?Sized,
    C: ConntrackInjector,
{
    /// Create a redirector over `table`
    pub fn new(table: Arc<T>, injector: C, timeout: Duration) -> Self {
        Self {
            table,
            injector,
            timeout,
            stats: RedirectStats::default(),
        }
    }

    /// Handle one packet
    pub fn handle(&mut self, packet: &ClassifiedPacket) -> RedirectOutcome {
        let outcome = self.redirect(packet);
        self.stats.record(outcome);
        outcome
    }

    fn redirect(&self, packet: &ClassifiedPacket) -> RedirectOutcome {
        let logical = packet.dst_addr;
        if !self.table.is_logical(logical) {
            return RedirectOutcome::NotManaged;
        }

        let Some(real) = self.table.forward_lookup(logical) else {
            debug!(%logical, "No mapping for destination");
            return RedirectOutcome::Miss;
        };

        match self.injector.exists(packet) {
            Ok(true) => return RedirectOutcome::AlreadyTracked(real),
            Ok(false) => {}
            Err(e) => {
                warn!(%logical, %real, "Conntrack query failed: {}", e);
                return RedirectOutcome::Failed(real);
            }
        }

        info!("{}", ConnectionLog { packet, real });

        match self.injector.create(packet, real, self.timeout) {
            Ok(()) => RedirectOutcome::Installed(real),
            Err(e) => {
                warn!(%logical, %real, "Conntrack create failed: {}", e);
                RedirectOutcome::Failed(real)
            }
        }
    }

    /// Counters since creation
    pub fn stats(&self) -> &RedirectStats {
        &self.stats
    }

    /// Idle timeout given to new entries
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// `<PROTO> connection from src[:sport] to real[:dport] via logical`
struct ConnectionLog<'a> {
    packet: &'a ClassifiedPacket,
    real: Ipv4Addr,
}

impl fmt::Display for ConnectionLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.packet;
        match (p.protocol, p.transport) {
            (Protocol::Icmp, Transport::Icmp { icmp_type, .. }) => write!(f, "ICMP {icmp_type}")?,
            (proto, _) => write!(f, "{proto}")?,
        }
        write!(
            f,
            " connection from {} to {} via {}",
            Endpoint(p.src_addr, p.src_port()),
            Endpoint(self.real, p.dst_port()),
            p.dst_addr
        )
    }
}
