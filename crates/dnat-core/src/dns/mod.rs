//! DNS rewrite server
//!
//! Answers A queries on a local UDP port by resolving them upstream and
//! substituting a logical address from the dynamic table for every real
//! address in the answer. Clients then connect to the logical address and
//! the packet redirector takes over.
//!
//! - [`UdpUpstream`] sends one recursive query per question
//! - [`Resolution`] classifies the upstream reply and walks its alias chain
//! - [`DnsRewriter`] builds the client reply
//! - [`DnsRewriteServer`] owns the listening socket

mod rewrite;
mod server;
mod upstream;

pub use rewrite::{DnsRewriter, Resolution, ResolvedChain, MAX_CHAIN_DEPTH};
pub use server::DnsRewriteServer;
pub use upstream::UdpUpstream;

use std::net::Ipv4Addr;

/// One-way recorder of every resolved real address
///
/// Implementations must not block the caller.
pub trait SetSink: Send + Sync {
    /// Record `addr` as a member of the set
    fn add(&self, addr: Ipv4Addr);
}
