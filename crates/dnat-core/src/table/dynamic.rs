//! Dynamic translation table
//!
//! Logical addresses are allocated from a [`NatRange`] on the first reverse
//! lookup of each real address. The forward index is split into 256 buckets
//! keyed by the high-order byte of the logical address so an insertion only
//! shifts entries inside one bucket. The reverse index is one global array
//! sorted by real address that stores logical address values.

use super::AddressTable;
use crate::config::NatRange;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

const BUCKETS: usize = 256;

/// Next-candidate state for logical address allocation
#[derive(Debug, Clone)]
pub struct AllocationCursor {
    /// Next candidate; one past `max` means the pool is exhausted
    next: u64,
    min: u32,
    max: u32,
}

impl AllocationCursor {
    /// Create a cursor positioned at the start of `range`
    pub fn new(range: &NatRange) -> Self {
        Self {
            next: u64::from(u32::from(range.start())),
            min: u32::from(range.min()),
            max: u32::from(range.max()),
        }
    }

    /// Take the next logical address
    ///
    /// Returns the address and whether the cursor had to wrap around to the
    /// minimum of the range first.
    pub fn advance(&mut self) -> (Ipv4Addr, bool) {
        let wrapped = self.next > u64::from(self.max);
        if wrapped {
            self.next = u64::from(self.min);
        }
        // Lossless: `next` is within [min, max] at this point
        let addr = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        (addr, wrapped)
    }

    /// The address the next call to [`advance`](Self::advance) returns
    pub fn peek(&self) -> Ipv4Addr {
        if self.next > u64::from(self.max) {
            Ipv4Addr::from(self.min)
        } else {
            Ipv4Addr::from(self.next as u32)
        }
    }
}

#[derive(Debug)]
struct Inner {
    /// (logical, real) pairs, sorted by logical within each bucket
    buckets: Vec<Vec<(u32, u32)>>,
    /// (real, logical) pairs sorted by real, then logical
    reverse: Vec<(u32, u32)>,
    cursor: AllocationCursor,
}

impl Inner {
    fn bucket_of(logical: u32) -> usize {
        (logical >> 24) as usize
    }

    fn lookup(&self, logical: u32) -> Option<u32> {
        let bucket = &self.buckets[Self::bucket_of(logical)];
        bucket
            .binary_search_by_key(&logical, |&(l, _)| l)
            .ok()
            .map(|idx| bucket[idx].1)
    }

    fn reverse_lookup(&self, real: u32) -> Option<u32> {
        let idx = self.reverse.partition_point(|&(r, _)| r < real);
        match self.reverse.get(idx) {
            Some(&(r, logical)) if r == real => Some(logical),
            _ => None,
        }
    }

    /// Insert or overwrite `logical`, keeping both indexes in step
    fn insert(&mut self, logical: u32, real: u32) {
        let bucket = &mut self.buckets[Self::bucket_of(logical)];
        match bucket.binary_search_by_key(&logical, |&(l, _)| l) {
            Ok(idx) => {
                let previous = std::mem::replace(&mut bucket[idx].1, real);
                if previous == real {
                    return;
                }
                if let Ok(pos) = self.reverse.binary_search(&(previous, logical)) {
                    self.reverse.remove(pos);
                }
            }
            Err(idx) => bucket.insert(idx, (logical, real)),
        }

        if let Err(pos) = self.reverse.binary_search(&(real, logical)) {
            self.reverse.insert(pos, (real, logical));
        }
    }
}

/// Translation table for dynamic (DNS-driven) mode
#[derive(Debug)]
pub struct DynamicTable {
    range: NatRange,
    inner: Mutex<Inner>,
}

impl DynamicTable {
    /// Create an empty table allocating from `range`
    pub fn new(range: NatRange) -> Self {
        Self {
            range,
            inner: Mutex::new(Inner {
                buckets: vec![Vec::new(); BUCKETS],
                reverse: Vec::new(),
                cursor: AllocationCursor::new(&range),
            }),
        }
    }

    /// The configured logical address pool
    pub fn range(&self) -> NatRange {
        self.range
    }

    /// Insert or update a mapping; the last write for a logical address wins
    pub fn add(&self, logical: Ipv4Addr, real: Ipv4Addr) {
        debug!("adding DNAT from {} to {}", logical, real);
        self.inner.lock().insert(u32::from(logical), u32::from(real));
    }

    /// Map a logical address to its real destination
    pub fn forward_lookup(&self, logical: Ipv4Addr) -> Option<Ipv4Addr> {
        self.inner.lock().lookup(u32::from(logical)).map(Ipv4Addr::from)
    }

    /// Return the logical address of `real`, allocating one on a miss
    ///
    /// The search and the allocation happen under one lock acquisition, so
    /// concurrent callers for the same real address always agree.
    pub fn reverse_lookup_or_allocate(&self, real: Ipv4Addr) -> Ipv4Addr {
        let real_key = u32::from(real);
        let mut inner = self.inner.lock();

        if let Some(logical) = inner.reverse_lookup(real_key) {
            return Ipv4Addr::from(logical);
        }

        let (logical, wrapped) = inner.cursor.advance();
        if wrapped {
            warn!(range = %self.range, "ran out of IP addresses; looping around");
        }
        debug!("adding DNAT from {} to {}", logical, real);
        inner.insert(u32::from(logical), real_key);
        logical
    }

    /// Next logical address the cursor would allocate
    pub fn next_allocation(&self) -> Ipv4Addr {
        self.inner.lock().cursor.peek()
    }

    /// Number of mappings
    pub fn len(&self) -> usize {
        self.inner.lock().reverse.len()
    }

    /// Whether the table holds no mappings
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every mapping as (logical, real), ordered by logical address
    pub fn mappings(&self) -> Vec<(Ipv4Addr, Ipv4Addr)> {
        let inner = self.inner.lock();
        inner
            .buckets
            .iter()
            .flatten()
            .map(|&(l, r)| (Ipv4Addr::from(l), Ipv4Addr::from(r)))
            .collect()
    }
}

impl AddressTable for DynamicTable {
    fn is_logical(&self, addr: Ipv4Addr) -> bool {
        self.range.contains(addr)
    }

    fn forward_lookup(&self, logical: Ipv4Addr) -> Option<Ipv4Addr> {
        DynamicTable::forward_lookup(self, logical)
    }
}
