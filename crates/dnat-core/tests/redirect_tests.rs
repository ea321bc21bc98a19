//! Integration tests for packet redirection, route sync and reload

use dnat_core::packet::{ClassifiedPacket, Protocol, Transport};
use dnat_core::redirect::{ConntrackInjector, RedirectOutcome, Redirector};
use dnat_core::reload::{ChangeSource, Reloader};
use dnat_core::routes::{RouteBackend, RouteSession, RouteSynchronizer, RouteTarget};
use dnat_core::table::{DynamicTable, StaticTable};
use dnat_core::{Error, Result};
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// In-memory kernel connection table
#[derive(Default, Clone)]
struct FakeConntrack {
    flows: Arc<Mutex<HashSet<ClassifiedPacket>>>,
    created: Arc<Mutex<Vec<(ClassifiedPacket, Ipv4Addr, Duration)>>>,
}

impl ConntrackInjector for FakeConntrack {
    fn exists(&self, flow: &ClassifiedPacket) -> Result<bool> {
        Ok(self.flows.lock().contains(flow))
    }

    fn create(&self, flow: &ClassifiedPacket, real: Ipv4Addr, timeout: Duration) -> Result<()> {
        if !self.flows.lock().insert(*flow) {
            return Err(Error::kernel("conntrack create", "File exists"));
        }
        self.created.lock().push((*flow, real, timeout));
        Ok(())
    }
}

/// In-memory routing table shared by every session
///
/// Destinations in `refused` are rejected on add; routes in `pinned` cannot
/// be deleted.
#[derive(Default, Clone)]
struct FakeRoutes {
    routes: Arc<Mutex<BTreeSet<Ipv4Net>>>,
    refused: Arc<Mutex<HashSet<Ipv4Addr>>>,
    pinned: Arc<Mutex<HashSet<Ipv4Net>>>,
    sessions: Arc<Mutex<usize>>,
}

struct FakeSession(FakeRoutes);

impl RouteBackend for FakeRoutes {
    fn open(&self, _target: &RouteTarget) -> Result<Box<dyn RouteSession>> {
        *self.sessions.lock() += 1;
        Ok(Box::new(FakeSession(self.clone())))
    }
}

impl RouteSession for FakeSession {
    fn dump(&mut self) -> Result<Vec<Ipv4Net>> {
        Ok(self.0.routes.lock().iter().copied().collect())
    }

    fn delete(&mut self, route: &Ipv4Net) -> Result<()> {
        if self.0.pinned.lock().contains(route) {
            return Err(Error::kernel("route del", "RTNETLINK answers: Operation not permitted"));
        }
        self.0.routes.lock().remove(route);
        Ok(())
    }

    fn add_host(&mut self, dst: Ipv4Addr) -> Result<()> {
        if self.0.refused.lock().contains(&dst) {
            return Err(Error::kernel("route add", "RTNETLINK answers: Network is unreachable"));
        }
        let net = Ipv4Net::new(dst, 32).map_err(|e| Error::kernel("route add", e.to_string()))?;
        if !self.0.routes.lock().insert(net) {
            return Err(Error::kernel("route add", "RTNETLINK answers: File exists"));
        }
        Ok(())
    }
}

fn target() -> RouteTarget {
    RouteTarget {
        table: 100,
        interface: "wg0".to_string(),
        protocol: 67,
    }
}

fn mapping_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// ============ Redirector Tests ============

#[test]
fn test_dynamic_flow_installed_once() {
    let table = Arc::new(DynamicTable::new("10.64.0.0/16".parse().unwrap()));
    let logical = table.reverse_lookup_or_allocate(Ipv4Addr::new(93, 184, 216, 34));
    let conntrack = FakeConntrack::default();
    let mut redirector = Redirector::new(table, conntrack.clone(), Duration::from_secs(120));

    let packet = ClassifiedPacket::with_ports(Protocol::Tcp, Ipv4Addr::new(192, 168, 1, 5), 40000, logical, 443);

    assert_eq!(
        redirector.handle(&packet),
        RedirectOutcome::Installed(Ipv4Addr::new(93, 184, 216, 34))
    );
    assert_eq!(
        redirector.handle(&packet),
        RedirectOutcome::AlreadyTracked(Ipv4Addr::new(93, 184, 216, 34))
    );

    let created = conntrack.created.lock();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].2, Duration::from_secs(120));
}

#[test]
fn test_icmp_echo_ids_are_separate_flows() {
    let table = Arc::new(DynamicTable::new("10.64.0.0/16".parse().unwrap()));
    let logical = table.reverse_lookup_or_allocate(Ipv4Addr::new(1, 1, 1, 1));
    let conntrack = FakeConntrack::default();
    let mut redirector = Redirector::new(table, conntrack.clone(), Duration::from_secs(120));

    let ping = |id| ClassifiedPacket {
        protocol: Protocol::Icmp,
        src_addr: Ipv4Addr::new(192, 168, 1, 5),
        dst_addr: logical,
        transport: Transport::Icmp {
            icmp_type: 8,
            code: 0,
            echo_id: Some(id),
        },
    };

    assert!(matches!(redirector.handle(&ping(1)), RedirectOutcome::Installed(_)));
    assert!(matches!(redirector.handle(&ping(2)), RedirectOutcome::Installed(_)));
    assert!(matches!(redirector.handle(&ping(1)), RedirectOutcome::AlreadyTracked(_)));
}

#[test]
fn test_stats_cover_every_outcome() {
    let table = Arc::new(DynamicTable::new("10.64.0.0/16".parse().unwrap()));
    let logical = table.reverse_lookup_or_allocate(Ipv4Addr::new(1, 1, 1, 1));
    let mut redirector = Redirector::new(table, FakeConntrack::default(), Duration::from_secs(120));
    let src = Ipv4Addr::new(192, 168, 1, 5);

    redirector.handle(&ClassifiedPacket::with_ports(Protocol::Udp, src, 1, Ipv4Addr::new(8, 8, 8, 8), 53));
    redirector.handle(&ClassifiedPacket::with_ports(Protocol::Udp, src, 1, Ipv4Addr::new(10, 64, 9, 9), 53));
    redirector.handle(&ClassifiedPacket::with_ports(Protocol::Udp, src, 1, logical, 53));
    redirector.handle(&ClassifiedPacket::with_ports(Protocol::Udp, src, 1, logical, 53));

    let stats = redirector.stats();
    assert_eq!(stats.packets, 4);
    assert_eq!(stats.not_managed, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.installed, 1);
    assert_eq!(stats.already_tracked, 1);
}

// ============ Route Sync Tests ============

#[test]
fn test_resync_is_idempotent() {
    let file = mapping_file("10.0.0.5, 203.0.113.9\n, 203.0.113.10\n");
    let table = StaticTable::load(file.path()).unwrap();
    let routes = FakeRoutes::default();
    let sync = RouteSynchronizer::new(Box::new(routes.clone()), target());

    sync.resync(&table).unwrap();
    let first = routes.routes.lock().clone();
    sync.resync(&table).unwrap();
    let second = routes.routes.lock().clone();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(*routes.sessions.lock(), 2);
}

#[test]
fn test_resync_removes_stale_routes() {
    let table = StaticTable::load(mapping_file(", 198.51.100.7\n").path()).unwrap();
    let routes = FakeRoutes::default();
    routes.routes.lock().insert("192.0.2.1/32".parse().unwrap());

    RouteSynchronizer::new(Box::new(routes.clone()), target())
        .resync(&table)
        .unwrap();

    let expected: BTreeSet<Ipv4Net> = ["198.51.100.7/32".parse().unwrap()].into_iter().collect();
    assert_eq!(*routes.routes.lock(), expected);
}

// ============ Reload Tests ============

#[test]
fn test_reload_updates_routes() {
    let file = mapping_file("10.0.0.5, 203.0.113.9\n");
    let table = Arc::new(StaticTable::load(file.path()).unwrap());
    let routes = FakeRoutes::default();
    let reloader = Reloader::new(
        file.path(),
        Arc::clone(&table),
        RouteSynchronizer::new(Box::new(routes.clone()), target()),
    );
    reloader.sync_routes().unwrap();

    std::fs::write(file.path(), "10.0.0.5, 198.51.100.1\n, 198.51.100.2\n").unwrap();
    assert!(reloader.on_change().unwrap());

    let expected: BTreeSet<Ipv4Net> = ["198.51.100.1/32", "198.51.100.2/32"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(*routes.routes.lock(), expected);
}

#[test]
fn test_rejected_reload_leaves_routes() {
    let file = mapping_file("10.0.0.5, 203.0.113.9\n");
    let table = Arc::new(StaticTable::load(file.path()).unwrap());
    let routes = FakeRoutes::default();
    let reloader = Reloader::new(
        file.path(),
        Arc::clone(&table),
        RouteSynchronizer::new(Box::new(routes.clone()), target()),
    );
    reloader.sync_routes().unwrap();

    std::fs::write(file.path(), "10.0.0.5 203.0.113.9\n").unwrap();
    assert!(!reloader.on_change().unwrap());

    assert_eq!(*routes.sessions.lock(), 1);
    assert_eq!(routes.routes.lock().len(), 1);
}

#[test]
fn test_reload_skips_routes_the_kernel_refuses() {
    let file = mapping_file("10.0.0.5, 203.0.113.9\n");
    let table = Arc::new(StaticTable::load(file.path()).unwrap());
    let routes = FakeRoutes::default();
    let reloader = Reloader::new(
        file.path(),
        Arc::clone(&table),
        RouteSynchronizer::new(Box::new(routes.clone()), target()),
    );
    reloader.sync_routes().unwrap();

    let pinned: Ipv4Net = "203.0.113.9/32".parse().unwrap();
    routes.pinned.lock().insert(pinned);
    routes.refused.lock().insert(Ipv4Addr::new(198, 51, 100, 1));

    std::fs::write(
        file.path(),
        "10.0.0.5, 198.51.100.1\n, 198.51.100.2\n, 198.51.100.3\n",
    )
    .unwrap();
    assert!(reloader.on_change().unwrap());

    let expected: BTreeSet<Ipv4Net> = ["198.51.100.2/32", "198.51.100.3/32", "203.0.113.9/32"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(*routes.routes.lock(), expected);
    assert_eq!(table.forward_lookup(Ipv4Addr::new(10, 0, 0, 5)), Some(Ipv4Addr::new(198, 51, 100, 1)));
}

#[test]
fn test_watch_continues_after_refused_routes() {
    struct Edits {
        file: std::path::PathBuf,
        steps: Vec<&'static str>,
    }

    impl ChangeSource for Edits {
        fn wait_for_change(&mut self) -> Result<()> {
            if self.steps.is_empty() {
                return Err(Error::resource("watch", "watched file removed"));
            }
            std::fs::write(&self.file, self.steps.remove(0))?;
            Ok(())
        }
    }

    let file = mapping_file("10.0.0.5, 203.0.113.9\n");
    let table = Arc::new(StaticTable::load(file.path()).unwrap());
    let routes = FakeRoutes::default();
    routes.refused.lock().insert(Ipv4Addr::new(198, 51, 100, 1));
    let reloader = Reloader::new(
        file.path(),
        Arc::clone(&table),
        RouteSynchronizer::new(Box::new(routes.clone()), target()),
    );
    let mut source = Edits {
        file: file.path().to_path_buf(),
        steps: vec!["10.0.0.5, 198.51.100.1\n", "10.0.0.5, 198.51.100.1\n, 198.51.100.2\n"],
    };

    let running = AtomicBool::new(true);
    let result = reloader.run(&mut source, &running);

    assert!(matches!(result, Err(Error::Resource { .. })));
    assert_eq!(*routes.sessions.lock(), 2);
    let expected: BTreeSet<Ipv4Net> = ["198.51.100.2/32".parse().unwrap()].into_iter().collect();
    assert_eq!(*routes.routes.lock(), expected);
}
