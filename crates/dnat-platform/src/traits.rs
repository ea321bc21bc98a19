//! Platform-agnostic traits for packet queues
//!
//! These traits define the interface that platform-specific implementations must follow.

use crate::{PlatformError, Result};
use dnat_core::packet::ClassifiedPacket;
use dnat_core::redirect::{ConntrackInjector, Redirector};
use dnat_core::table::AddressTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A packet held by the kernel until a verdict is issued
pub trait QueuedMessage {
    /// Raw network-layer packet
    fn payload(&self) -> &[u8];
}

/// Kernel packet queue interface
///
/// Implemented by platform-specific drivers (NFQUEUE, ...).
pub trait PacketQueue: Send {
    /// Message type handed out by [`recv`](Self::recv)
    type Message: QueuedMessage;

    /// Receive the next queued packet
    ///
    /// This blocks until a packet is available.
    fn recv(&mut self) -> Result<Self::Message>;

    /// Let the packet continue, optionally tagging it with a firewall mark
    fn accept(&mut self, message: Self::Message, mark: Option<u32>) -> Result<()>;
}

/// Receive failures in a row after which the queue is considered dead
pub(crate) const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 64;

/// Pause after a failed receive
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(5);

/// Feed every queued packet through `redirector` until `running` is cleared
///
/// Every packet is accepted, whether or not a redirection was installed.
/// Receive errors are logged and skipped until
/// [`MAX_CONSECUTIVE_RECV_ERRORS`] happen in a row. A failed verdict ends the
/// loop.
pub fn serve_queue<Q, T, C>(
    queue: &mut Q,
    redirector: &mut Redirector<T, C>,
    mark: Option<u32>,
    running: &AtomicBool,
) -> Result<()>
where
    Q: PacketQueue,
    T: AddressTable + ?Sized,
    C: ConntrackInjector,
{
    let mut recv_errors = 0u32;
    while running.load(Ordering::SeqCst) {
        let message = match queue.recv() {
            Ok(message) => {
                recv_errors = 0;
                message
            }
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    continue;
                }
                recv_errors += 1;
                warn!(consecutive = recv_errors, "Receive error: {}", e);
                if recv_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                    return Err(PlatformError::QueueRecv(format!(
                        "{} consecutive receive errors, last: {}",
                        recv_errors, e
                    )));
                }
                thread::sleep(RECV_ERROR_BACKOFF);
                continue;
            }
        };

        match ClassifiedPacket::from_bytes(message.payload()) {
            Ok(packet) => {
                redirector.handle(&packet);
            }
            Err(e) => debug!("Failed to parse packet: {}", e),
        }

        queue.accept(message, mark)?;
    }

    let stats = redirector.stats();
    info!(
        packets = stats.packets,
        installed = stats.installed,
        already_tracked = stats.already_tracked,
        misses = stats.misses,
        not_managed = stats.not_managed,
        failed = stats.failed,
        "Packet queue stopped"
    );
    Ok(())
}
