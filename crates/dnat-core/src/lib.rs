//! # dnat core
//!
//! Platform-independent core of a DNS-driven and static destination NAT
//! redirector.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Translation tables** - dynamic (allocated on demand) and static (file backed)
//! - **DNS rewriting** - answers A queries with logical addresses
//! - **Packet redirection** - installs kernel DNAT entries for logical destinations
//! - **Route synchronisation and reload** - keeps kernel host routes in step with the static table
//! - **Configuration** - tunables shared by every mode
//!
//! Kernel access goes through the [`redirect::ConntrackInjector`],
//! [`routes::RouteBackend`], [`dns::SetSink`] and [`reload::ChangeSource`]
//! traits, implemented for Linux in `dnat-platform`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dnat_core::table::DynamicTable;
//!
//! let table = DynamicTable::new("10.64.0.0/16".parse()?);
//! let logical = table.reverse_lookup_or_allocate("93.184.216.34".parse()?);
//! assert_eq!(table.forward_lookup(logical), Some("93.184.216.34".parse()?));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dns;
pub mod error;
pub mod packet;
pub mod redirect;
pub mod reload;
pub mod routes;
pub mod table;

// Re-exports for convenience
pub use config::{Config, NatRange};
pub use error::{Error, Result};
pub use packet::ClassifiedPacket;
pub use redirect::{RedirectOutcome, RedirectStats, Redirector};
pub use table::{AddressTable, DynamicTable, StaticTable};
