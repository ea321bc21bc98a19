//! Linux netfilter, iproute2 and inotify collaborators

mod conntrack;
mod ipset;
mod nfqueue;
mod routes;
mod tool;
mod watcher;

pub use conntrack::ConntrackTool;
pub use ipset::{IpsetSink, MAX_SET_NAME_LEN};
pub use nfqueue::NfQueue;
pub use routes::IpRouteBackend;
pub use tool::Tool;
pub use watcher::InotifyWatcher;
