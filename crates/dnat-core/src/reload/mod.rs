//! Static table hot reload
//!
//! A [`ChangeSource`] blocks until the mapping file changed; the
//! [`Reloader`] then rebuilds the table and, when that succeeds, resyncs
//! the kernel routes.

use crate::error::Result;
use crate::routes::RouteSynchronizer;
use crate::table::StaticTable;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blocking source of file change notifications
pub trait ChangeSource: Send {
    /// Block until the watched file may have changed
    ///
    /// Errors are fatal: the watch is gone and cannot be re-established.
    fn wait_for_change(&mut self) -> Result<()>;
}

/// Reloads a static table and its routes on demand
pub struct Reloader {
    path: PathBuf,
    table: Arc<StaticTable>,
    routes: RouteSynchronizer,
}

impl Reloader {
    /// Create a reloader for `table`, loaded from `path`
    pub fn new(path: impl Into<PathBuf>, table: Arc<StaticTable>, routes: RouteSynchronizer) -> Self {
        Self {
            path: path.into(),
            table,
            routes,
        }
    }

    /// The mapping file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bring kernel routes in line with the current table
    pub fn sync_routes(&self) -> Result<usize> {
        self.routes.resync(&self.table)
    }

    /// Handle one change notification
    ///
    /// A rejected file keeps the current table and is not an error. A route
    /// session that cannot be opened or listed is returned.
    pub fn on_change(&self) -> Result<bool> {
        if self.table.reload(&self.path).is_err() {
            return Ok(false);
        }
        self.sync_routes()?;
        Ok(true)
    }

    /// Reload on every change until `running` is cleared or the source fails
    ///
    /// Kernel errors from a resync are logged and the watch continues; the
    /// next change retries the whole resync.
    pub fn run(&self, source: &mut dyn ChangeSource, running: &AtomicBool) -> Result<()> {
        info!(path = %self.path.display(), "Watching mapping file");
        while running.load(Ordering::SeqCst) {
            source.wait_for_change()?;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            debug!(path = %self.path.display(), "Mapping file changed");
            if let Err(e) = self.on_change() {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(path = %self.path.display(), "Route resync failed: {}", e);
            }
        }
        Ok(())
    }
}
