//! dnat Platform Layer
//!
//! Kernel-facing implementations of the seams defined in `dnat-core`.
//!
//! ## Supported Platforms
//!
//! - **Linux**: NFQUEUE for packets, `conntrack`, `ip route` and `ipset`
//!   through their userspace tools, inotify for the mapping file
//!
//! The packet loop itself, [`serve_queue`], is platform independent.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub use error::{PlatformError, Result};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::{ConntrackTool, InotifyWatcher, IpRouteBackend, IpsetSink, NfQueue};

// Platform-agnostic traits
mod traits;
pub use traits::{serve_queue, PacketQueue, QueuedMessage};
