//! Address translation tables
//!
//! Two variants share the lookup side:
//! - [`DynamicTable`] grows one mapping at a time as the DNS server allocates
//!   logical addresses for resolved real addresses.
//! - [`StaticTable`] is rebuilt wholesale from a mapping file and swapped in
//!   atomically on reload.
//!
//! Both guard their state with a single mutex held for the full duration of
//! each public operation and never across blocking I/O.

mod dynamic;
mod static_map;

pub use dynamic::{AllocationCursor, DynamicTable};
pub use static_map::{StaticTable, TableSnapshot, ValuesGuard};

use std::net::Ipv4Addr;

/// Maximum width of a dotted-quad field ("255.255.255.255")
pub const MAX_FIELD_LEN: usize = 15;

/// Lookup side of a translation table, as seen by the packet redirector
pub trait AddressTable: Send + Sync {
    /// Whether `addr` may be a logical address of this table
    fn is_logical(&self, addr: Ipv4Addr) -> bool;

    /// Map a logical address to its real destination
    ///
    /// `None` is a lookup miss, not a failure.
    fn forward_lookup(&self, logical: Ipv4Addr) -> Option<Ipv4Addr>;
}
