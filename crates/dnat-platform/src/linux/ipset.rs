//! Feeding allocated real addresses into an ipset

use super::tool::{args, Tool};
use crate::{PlatformError, Result};
use dnat_core::dns::SetSink;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Kernel limit on set names, including the terminator
pub const MAX_SET_NAME_LEN: usize = 32;

/// Adds addresses to a named ipset from a background thread
///
/// DNS handling never blocks on the `ipset` tool; additions are queued and
/// applied in order.
pub struct IpsetSink {
    name: String,
    sender: Mutex<Sender<Ipv4Addr>>,
}

impl IpsetSink {
    /// Start the writer thread for set `name`
    pub fn spawn(name: &str) -> Result<(Self, JoinHandle<()>)> {
        Self::spawn_with_tool(name, Tool::IPSET)
    }

    /// Start the writer thread using a specific program
    pub fn spawn_with_tool(name: &str, tool: Tool) -> Result<(Self, JoinHandle<()>)> {
        validate_set_name(name)?;

        let (sender, receiver) = channel::<Ipv4Addr>();
        let set = name.to_string();
        let handle = thread::Builder::new()
            .name("ipset".to_string())
            .spawn(move || {
                for addr in receiver {
                    match tool.run(&args!["add", "-exist", set, addr]) {
                        Ok(_) => debug!(set = %set, %addr, "Added to ipset"),
                        Err(e) => warn!(set = %set, %addr, "ipset add failed: {}", e),
                    }
                }
            })?;

        Ok((
            Self {
                name: name.to_string(),
                sender: Mutex::new(sender),
            },
            handle,
        ))
    }

    /// Target set name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SetSink for IpsetSink {
    fn add(&self, addr: Ipv4Addr) {
        if self.sender.lock().send(addr).is_err() {
            warn!(set = %self.name, %addr, "ipset writer has stopped");
        }
    }
}

fn validate_set_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() >= MAX_SET_NAME_LEN {
        "longer than 31 characters"
    } else {
        return Ok(());
    };
    Err(PlatformError::InvalidSetName {
        name: name.to_string(),
        reason,
    })
}
