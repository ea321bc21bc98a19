//! Mapping file change notifications through inotify

use crate::{PlatformError, Result};
use dnat_core::reload::ChangeSource;
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

const EVENT_BUFFER_LEN: usize = 4096;

/// Blocks until a single file is modified, replaced or removed
pub struct InotifyWatcher {
    inotify: Inotify,
    path: PathBuf,
    wd: WatchDescriptor,
    settle_delay: Duration,
    buffer: Vec<u8>,
}

impl InotifyWatcher {
    /// Watch `path`, which must exist
    ///
    /// After a delete or move of the file, the watch is re-established once
    /// `settle_delay` has passed, giving editors time to put the new file in
    /// place.
    pub fn new(path: impl Into<PathBuf>, settle_delay: Duration) -> Result<Self> {
        let path = path.into();
        let inotify = Inotify::init().map_err(|e| watch_error(&path, &e))?;
        let wd = add_watch(&inotify, &path)?;
        debug!(path = %path.display(), "Watch established");
        Ok(Self {
            inotify,
            path,
            wd,
            settle_delay,
            buffer: vec![0; EVENT_BUFFER_LEN],
        })
    }

    /// The watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rewatch(&mut self) -> Result<()> {
        thread::sleep(self.settle_delay);
        // The old descriptor is usually gone already
        let _ = self.inotify.watches().remove(self.wd.clone());
        self.wd = add_watch(&self.inotify, &self.path)?;
        debug!(path = %self.path.display(), "Watch re-established");
        Ok(())
    }

    fn next_change(&mut self) -> Result<()> {
        loop {
            let masks: Vec<EventMask> = self
                .inotify
                .read_events_blocking(&mut self.buffer)
                .map_err(|e| watch_error(&self.path, &e))?
                .filter(|event| event.wd == self.wd)
                .map(|event| event.mask)
                .collect();

            let mut changed = false;
            let mut replaced = false;
            for mask in masks {
                trace!(path = %self.path.display(), ?mask, "inotify event");
                if mask.intersects(EventMask::DELETE_SELF | EventMask::MOVE_SELF | EventMask::IGNORED) {
                    replaced = true;
                } else if mask.contains(EventMask::MODIFY) {
                    changed = true;
                }
            }

            if replaced {
                self.rewatch()?;
                return Ok(());
            }
            if changed {
                return Ok(());
            }
        }
    }
}

impl ChangeSource for InotifyWatcher {
    fn wait_for_change(&mut self) -> dnat_core::Result<()> {
        Ok(self.next_change()?)
    }
}

fn add_watch(inotify: &Inotify, path: &Path) -> Result<WatchDescriptor> {
    inotify
        .watches()
        .add(path, WatchMask::MODIFY | WatchMask::DELETE_SELF | WatchMask::MOVE_SELF)
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PlatformError::WatchedFileRemoved(path.display().to_string())
            } else {
                watch_error(path, &e)
            }
        })
}

fn watch_error(path: &Path, err: &std::io::Error) -> PlatformError {
    PlatformError::Watch {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
