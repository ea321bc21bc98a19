//! NFQUEUE packet source

use crate::traits::{PacketQueue, QueuedMessage};
use crate::{PlatformError, Result};
use nfq::{Message, Queue, Verdict};
use tracing::info;

/// A bound netfilter queue
///
/// # Example
///
/// ```rust,ignore
/// use dnat_platform::linux::NfQueue;
/// use dnat_platform::PacketQueue;
///
/// let mut queue = NfQueue::open(0).expect("Failed to bind queue");
/// let msg = queue.recv().expect("Failed to receive");
/// queue.accept(msg, None).expect("Failed to accept");
/// ```
pub struct NfQueue {
    queue: Queue,
    number: u16,
}

impl NfQueue {
    /// Open a netlink socket and bind queue `number`
    ///
    /// # Errors
    /// Fails without `CAP_NET_ADMIN` or when the queue is already bound.
    pub fn open(number: u16) -> Result<Self> {
        let mut queue = Queue::open().map_err(|e| PlatformError::QueueInitFailed(format!("open: {e}")))?;
        queue
            .bind(number)
            .map_err(|e| PlatformError::QueueInitFailed(format!("bind queue {number}: {e}")))?;
        info!(queue = number, "NFQUEUE bound");
        Ok(Self { queue, number })
    }

    /// Bound queue number
    pub fn number(&self) -> u16 {
        self.number
    }
}

impl QueuedMessage for Message {
    fn payload(&self) -> &[u8] {
        self.get_payload()
    }
}

impl PacketQueue for NfQueue {
    type Message = Message;

    fn recv(&mut self) -> Result<Message> {
        self.queue.recv().map_err(|e| PlatformError::QueueRecv(e.to_string()))
    }

    fn accept(&mut self, mut message: Message, mark: Option<u32>) -> Result<()> {
        message.set_verdict(Verdict::Accept);
        if let Some(mark) = mark {
            message.set_nfmark(mark);
        }
        self.queue
            .verdict(message)
            .map_err(|e| PlatformError::Verdict(e.to_string()))
    }
}
