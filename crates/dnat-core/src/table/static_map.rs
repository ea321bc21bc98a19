//! Static translation table loaded from a mapping file
//!
//! File format, one row per line:
//!
//! ```text
//! 10.0.0.5, 203.0.113.9     # key -> value
//! , 203.0.113.10            # route-only value
//! ```
//!
//! Whitespace around fields is ignored and blank lines are skipped. A file is
//! accepted or rejected as a whole; a rejected reload leaves the running
//! snapshot untouched.

use super::{AddressTable, MAX_FIELD_LEN};
use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::net::Ipv4Addr;
use std::ops::Deref;
use std::path::Path;
use tracing::{debug, error, info};

const SOURCE_LABEL: &str = "<input>";

/// Immutable, indexed contents of one mapping file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Keys of the keyed rows, sorted by (low byte, key)
    keys: Vec<u32>,
    /// Values of the keyed rows in key order, then the route-only values
    values: Vec<Ipv4Addr>,
    /// `offsets[b]..offsets[b + 1]` is the run of keys whose low byte is `b`
    offsets: [usize; 257],
}

struct Row {
    line: usize,
    key: Option<u32>,
    value: Ipv4Addr,
}

impl TableSnapshot {
    /// An empty snapshot
    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            offsets: [0; 257],
        }
    }

    /// Parse and index a mapping file's contents
    pub fn parse(source: &str) -> Result<Self> {
        let delimiters = source.bytes().filter(|&b| b == b',').count();
        let mut rows = Vec::with_capacity(delimiters);

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            if raw.trim().is_empty() {
                continue;
            }
            rows.push(parse_row(raw, line)?);
        }

        if rows.len() != delimiters {
            return Err(Error::malformed(
                SOURCE_LABEL,
                0,
                format!("{} rows but {} ',' delimiters", rows.len(), delimiters),
            ));
        }

        Ok(Self::build(rows))
    }

    fn build(rows: Vec<Row>) -> Self {
        let (mut keyed, mut route_only): (Vec<Row>, Vec<Row>) =
            rows.into_iter().partition(|row| row.key.is_some());

        // Stable, so equal keys keep file order and the first one wins
        keyed.sort_by_key(|row| row.key.map(|k| (k & 0xff, k)));

        let mut keys: Vec<u32> = Vec::with_capacity(keyed.len());
        let mut values = Vec::with_capacity(keyed.len() + route_only.len());
        let mut demoted = Vec::new();

        for row in keyed {
            let Some(key) = row.key else { continue };
            if keys.last() == Some(&key) {
                debug!(
                    key = %Ipv4Addr::from(key),
                    line = row.line,
                    "duplicate key, keeping value for routing only"
                );
                demoted.push(Row { key: None, ..row });
                continue;
            }
            debug!("mapping {} to {}", Ipv4Addr::from(key), row.value);
            keys.push(key);
            values.push(row.value);
        }

        // Route-only rows in file order, demoted duplicates included
        route_only.append(&mut demoted);
        route_only.sort_by_key(|row| row.line);
        for row in route_only {
            debug!("routing {}", row.value);
            values.push(row.value);
        }

        let mut offsets = [0usize; 257];
        for &key in &keys {
            offsets[(key & 0xff) as usize + 1] += 1;
        }
        for b in 0..256 {
            offsets[b + 1] += offsets[b];
        }

        Self { keys, values, offsets }
    }

    /// Map a key to its value
    pub fn forward_lookup(&self, logical: Ipv4Addr) -> Option<Ipv4Addr> {
        let key = u32::from(logical);
        let byte = (key & 0xff) as usize;
        let (start, end) = (self.offsets[byte], self.offsets[byte + 1]);
        self.keys[start..end]
            .binary_search(&key)
            .ok()
            .map(|idx| self.values[start + idx])
    }

    /// Every value, keyed rows first
    pub fn values(&self) -> &[Ipv4Addr] {
        &self.values
    }

    /// Number of keyed rows
    pub fn mapping_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of route-only rows
    pub fn route_only_count(&self) -> usize {
        self.values.len() - self.keys.len()
    }
}

impl Default for TableSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

fn parse_row(raw: &str, line: usize) -> Result<Row> {
    let Some((key_field, value_field)) = raw.split_once(',') else {
        return Err(Error::malformed(SOURCE_LABEL, line, "missing ',' delimiter"));
    };

    let key_field = key_field.trim();
    let key = if key_field.is_empty() {
        None
    } else {
        Some(u32::from(parse_field(key_field, line)?))
    };

    let value_field = value_field.trim();
    if value_field.is_empty() {
        return Err(Error::malformed(SOURCE_LABEL, line, "missing value address"));
    }
    let value = parse_field(value_field, line)?;

    Ok(Row { line, key, value })
}

fn parse_field(field: &str, line: usize) -> Result<Ipv4Addr> {
    if field.len() > MAX_FIELD_LEN {
        return Err(Error::malformed(
            SOURCE_LABEL,
            line,
            format!("field longer than {} characters", MAX_FIELD_LEN),
        ));
    }
    field
        .parse()
        .map_err(|_| Error::malformed(SOURCE_LABEL, line, format!("invalid IPv4 address '{}'", field)))
}

/// Translation table for static mode
///
/// Holds the current snapshot behind one lock. A reload parses outside the
/// lock and swaps the finished snapshot in, so readers see either the old or
/// the new table in full.
#[derive(Debug, Default)]
pub struct StaticTable {
    inner: Mutex<TableSnapshot>,
}

impl StaticTable {
    /// Wrap an already-built snapshot
    pub fn new(snapshot: TableSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    /// Initial load; any failure is for the caller to treat as fatal
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let snapshot = read_snapshot(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            mappings = snapshot.mapping_count(),
            route_only = snapshot.route_only_count(),
            "Loaded static table"
        );
        Ok(Self::new(snapshot))
    }

    /// Rebuild from `path` and swap the result in
    ///
    /// Returns the number of values in the new table. On failure the current
    /// snapshot stays authoritative.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let snapshot = match read_snapshot(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(path = %path.display(), "Reload rejected, keeping current table: {}", e);
                return Err(e);
            }
        };

        let count = snapshot.values().len();
        let previous = std::mem::replace(&mut *self.inner.lock(), snapshot);
        drop(previous);

        info!(path = %path.display(), values = count, "Reloaded static table");
        Ok(count)
    }

    /// Map a key to its value in the current snapshot
    pub fn forward_lookup(&self, logical: Ipv4Addr) -> Option<Ipv4Addr> {
        self.inner.lock().forward_lookup(logical)
    }

    /// Lock the table and expose every value
    ///
    /// No reload can complete until the guard is released.
    pub fn iterate_values(&self) -> ValuesGuard<'_> {
        ValuesGuard {
            guard: self.inner.lock(),
        }
    }
}

fn read_snapshot(path: &Path) -> Result<TableSnapshot> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::resource("mapping file", format!("{}: {}", path.display(), e)))?;
    TableSnapshot::parse(&content).map_err(|e| e.with_path(&path.display().to_string()))
}

impl AddressTable for StaticTable {
    fn is_logical(&self, _addr: Ipv4Addr) -> bool {
        true
    }

    fn forward_lookup(&self, logical: Ipv4Addr) -> Option<Ipv4Addr> {
        StaticTable::forward_lookup(self, logical)
    }
}

/// Locked view of every value in a [`StaticTable`]
pub struct ValuesGuard<'a> {
    guard: MutexGuard<'a, TableSnapshot>,
}

impl ValuesGuard<'_> {
    /// Release the table lock
    pub fn release(self) {}
}

impl Deref for ValuesGuard<'_> {
    type Target = [Ipv4Addr];

    fn deref(&self) -> &[Ipv4Addr] {
        self.guard.values()
    }
}
