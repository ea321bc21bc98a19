//! Route synchronisation
//!
//! In static mode every value of the translation table gets a `/32` host
//! route through the configured interface, in a dedicated routing table and
//! tagged with a private route protocol number. Each resync clears every
//! route carrying that tag and rebuilds the set from the current table.
//! A single route the kernel refuses is logged and skipped; only a session
//! that cannot be opened or listed fails the resync.

use crate::error::Result;
use crate::table::StaticTable;
use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Where managed routes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Routing table id
    pub table: u32,
    /// Outgoing interface name
    pub interface: String,
    /// Route protocol number marking routes as ours
    pub protocol: u8,
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {} dev {} proto {}", self.table, self.interface, self.protocol)
    }
}

/// Opens routing sessions against the kernel
pub trait RouteBackend: Send + Sync {
    /// Open a fresh session for one resync
    fn open(&self, target: &RouteTarget) -> Result<Box<dyn RouteSession>>;
}

/// One routing session, scoped to a [`RouteTarget`]
#[cfg_attr(test, mockall::automock)]
pub trait RouteSession {
    /// List every IPv4 route in the target table with the target protocol
    fn dump(&mut self) -> Result<Vec<Ipv4Net>>;

    /// Delete one route previously returned by [`dump`](Self::dump)
    fn delete(&mut self, route: &Ipv4Net) -> Result<()>;

    /// Add a link-scope `/32` route to `dst` through the target interface
    fn add_host(&mut self, dst: Ipv4Addr) -> Result<()>;
}

/// Keeps kernel host routes in step with a static table
pub struct RouteSynchronizer {
    inner: Option<(Box<dyn RouteBackend>, RouteTarget)>,
}

impl RouteSynchronizer {
    /// Synchronizer writing to `target` through `backend`
    pub fn new(backend: Box<dyn RouteBackend>, target: RouteTarget) -> Self {
        Self {
            inner: Some((backend, target)),
        }
    }

    /// Synchronizer that does nothing
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether resyncs touch the kernel
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Clear every managed route and rebuild from `table`
    ///
    /// Returns the number of routes added. Per-route delete or add failures
    /// are logged and counted, never returned.
    pub fn resync(&self, table: &StaticTable) -> Result<usize> {
        let Some((backend, target)) = &self.inner else {
            return Ok(0);
        };

        let mut session = backend.open(target)?;

        let stale = session.dump()?;
        let mut failed = 0usize;
        for route in &stale {
            debug!(%route, "Deleting route");
            if let Err(e) = session.delete(route) {
                warn!(%route, "Failed to delete route: {}", e);
                failed += 1;
            }
        }

        let values = table.iterate_values();
        let wanted: BTreeSet<Ipv4Addr> = values.iter().copied().collect();
        values.release();

        let mut added = 0usize;
        for &dst in &wanted {
            debug!(%dst, "Adding route");
            match session.add_host(dst) {
                Ok(()) => added += 1,
                Err(e) => {
                    warn!(%dst, "Failed to add route: {}", e);
                    failed += 1;
                }
            }
        }

        info!(removed = stale.len(), added, failed, "Routes synchronised ({})", target);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::table::TableSnapshot;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct OneShot(Mutex<Option<MockRouteSession>>);

    impl RouteBackend for OneShot {
        fn open(&self, _target: &RouteTarget) -> Result<Box<dyn RouteSession>> {
            match self.0.lock().take() {
                Some(session) => Ok(Box::new(session)),
                None => Err(Error::resource("route session", "already used")),
            }
        }
    }

    fn target() -> RouteTarget {
        RouteTarget {
            table: 100,
            interface: "wg0".to_string(),
            protocol: 67,
        }
    }

    fn table(source: &str) -> StaticTable {
        StaticTable::new(TableSnapshot::parse(source).unwrap())
    }

    #[test]
    fn test_disabled_is_noop() {
        let sync = RouteSynchronizer::disabled();
        assert!(!sync.is_enabled());
        assert_eq!(sync.resync(&table("1.1.1.1,2.2.2.2\n")).unwrap(), 0);
    }

    #[test]
    fn test_clear_then_rebuild() {
        let mut seq = Sequence::new();
        let mut session = MockRouteSession::new();
        let stale: Ipv4Net = "203.0.113.1/32".parse().unwrap();

        session
            .expect_dump()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || Ok(vec![stale]));
        session
            .expect_delete()
            .with(eq(stale))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(2, 2, 2, 2)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(3, 3, 3, 3)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let sync = RouteSynchronizer::new(Box::new(OneShot(Mutex::new(Some(session)))), target());
        let added = sync.resync(&table("1.1.1.1,2.2.2.2\n,3.3.3.3\n")).unwrap();
        assert_eq!(added, 2);
    }

    #[test]
    fn test_duplicate_values_routed_once() {
        let mut session = MockRouteSession::new();
        session.expect_dump().returning(|| Ok(Vec::new()));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(2, 2, 2, 2)))
            .times(1)
            .returning(|_| Ok(()));

        let sync = RouteSynchronizer::new(Box::new(OneShot(Mutex::new(Some(session)))), target());
        assert_eq!(sync.resync(&table("1.1.1.1,2.2.2.2\n,2.2.2.2\n")).unwrap(), 1);
    }

    #[test]
    fn test_add_failure_is_skipped_and_releases_lock() {
        let mut session = MockRouteSession::new();
        session.expect_dump().returning(|| Ok(Vec::new()));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(2, 2, 2, 2)))
            .times(1)
            .returning(|_| Err(Error::kernel("route add", "RTNETLINK answers: File exists")));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(3, 3, 3, 3)))
            .times(1)
            .returning(|_| Ok(()));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(4, 4, 4, 4)))
            .times(1)
            .returning(|_| Ok(()));

        let table = Arc::new(table("1.1.1.1,2.2.2.2
,3.3.3.3
,4.4.4.4
"));
        let sync = RouteSynchronizer::new(Box::new(OneShot(Mutex::new(Some(session)))), target());
        assert_eq!(sync.resync(&table).unwrap(), 2);

        // The values guard is released even though a route failed
        assert_eq!(table.forward_lookup(Ipv4Addr::new(1, 1, 1, 1)), Some(Ipv4Addr::new(2, 2, 2, 2)));
    }

    #[test]
    fn test_delete_failure_is_skipped() {
        let mut session = MockRouteSession::new();
        let gone: Ipv4Net = "203.0.113.1/32".parse().unwrap();
        let kept: Ipv4Net = "203.0.113.2/32".parse().unwrap();
        session.expect_dump().returning(move || Ok(vec![gone, kept]));
        session
            .expect_delete()
            .with(eq(gone))
            .times(1)
            .returning(|_| Err(Error::kernel("route del", "RTNETLINK answers: No such process")));
        session.expect_delete().with(eq(kept)).times(1).returning(|_| Ok(()));
        session
            .expect_add_host()
            .with(eq(Ipv4Addr::new(2, 2, 2, 2)))
            .times(1)
            .returning(|_| Ok(()));

        let sync = RouteSynchronizer::new(Box::new(OneShot(Mutex::new(Some(session)))), target());
        assert_eq!(sync.resync(&table("1.1.1.1,2.2.2.2
")).unwrap(), 1);
    }

    #[test]
    fn test_dump_failure_is_returned() {
        let mut session = MockRouteSession::new();
        session
            .expect_dump()
            .returning(|| Err(Error::kernel("route show", "RTNETLINK answers: Operation not permitted")));
        session.expect_add_host().never();

        let sync = RouteSynchronizer::new(Box::new(OneShot(Mutex::new(Some(session)))), target());
        assert!(matches!(
            sync.resync(&table("1.1.1.1,2.2.2.2
")),
            Err(Error::Kernel { .. })
        ));
    }

    #[test]
    fn test_open_failure_is_returned() {
        let sync = RouteSynchronizer::new(Box::new(OneShot(Mutex::new(None))), target());
        assert!(matches!(
            sync.resync(&table("")),
            Err(Error::Resource { .. })
        ));
    }
}
