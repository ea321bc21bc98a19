//! Static mode - mapping file redirection with hot reload

use anyhow::{Context, Result};
use clap::Args;
use dnat_core::config::Config;
use dnat_core::table::StaticTable;
use std::path::PathBuf;
use tracing::info;

/// Static mode arguments
#[derive(Args, Debug)]
pub struct StaticArgs {
    /// NFQUEUE number receiving packets sent to mapped addresses
    pub queue_num: u16,

    /// Mapping file: `key, value` or `, value` per line
    pub csv_path: PathBuf,

    /// Routing table receiving a host route per value
    #[arg(requires = "interface_name")]
    pub route_table_id: Option<u32>,

    /// Interface the host routes point at
    pub interface_name: Option<String>,

    /// Parse the mapping file, report and exit
    #[arg(long)]
    pub check: bool,
}

/// Execute static mode
pub fn execute(args: StaticArgs, config: &Config) -> Result<()> {
    let table = StaticTable::load(&args.csv_path)
        .with_context(|| format!("Failed to load mapping file {}", args.csv_path.display()))?;

    if args.check {
        let values = table.iterate_values().len();
        println!("{} is valid: {} routed values", args.csv_path.display(), values);
        return Ok(());
    }

    info!(queue = args.queue_num, path = %args.csv_path.display(), "Starting static DNAT");
    run(args, table, config)
}

#[cfg(target_os = "linux")]
fn run(args: StaticArgs, table: StaticTable, config: &Config) -> Result<()> {
    use crate::supervisor::{install_signal_handler, Supervisor};
    use dnat_core::redirect::Redirector;
    use dnat_core::reload::Reloader;
    use dnat_core::routes::{RouteSynchronizer, RouteTarget};
    use dnat_platform::{serve_queue, ConntrackTool, InotifyWatcher, IpRouteBackend, NfQueue};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let table = Arc::new(table);

    let routes = match (args.route_table_id, args.interface_name) {
        (Some(table_id), Some(interface)) => {
            let backend = IpRouteBackend::new(&interface)
                .with_context(|| format!("Cannot route through '{interface}'"))?;
            RouteSynchronizer::new(
                Box::new(backend),
                RouteTarget {
                    table: table_id,
                    interface,
                    protocol: config.nat.route_protocol,
                },
            )
        }
        _ => RouteSynchronizer::disabled(),
    };

    let reloader = Reloader::new(&args.csv_path, Arc::clone(&table), routes);
    reloader.sync_routes().context("Initial route sync failed")?;

    let mut watcher = InotifyWatcher::new(&args.csv_path, config.reload.settle_delay())
        .with_context(|| format!("Failed to watch {}", args.csv_path.display()))?;

    let mut queue = NfQueue::open(args.queue_num)
        .with_context(|| format!("Failed to open NFQUEUE {}", args.queue_num))?;

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(Arc::clone(&running))?;

    let mut supervisor = Supervisor::new(running);
    supervisor.spawn("reload", move |running: &AtomicBool| {
        reloader.run(&mut watcher, running)?;
        Ok(())
    })?;

    let timeout = config.nat.conntrack_timeout();
    supervisor.spawn("nfqueue", move |running: &AtomicBool| {
        let mut redirector = Redirector::new(table, ConntrackTool::new(), timeout);
        serve_queue(&mut queue, &mut redirector, None, running)?;
        Ok(())
    })?;

    supervisor.wait()
}

#[cfg(not(target_os = "linux"))]
fn run(_args: StaticArgs, _table: StaticTable, _config: &Config) -> Result<()> {
    anyhow::bail!("static mode requires Linux netfilter")
}
