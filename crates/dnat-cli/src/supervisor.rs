//! Worker threads and shutdown

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

type Exit = (&'static str, Result<()>);

/// Clear `running` on SIGINT or SIGTERM
pub fn install_signal_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        running.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")
}

/// Owns the long-running workers of one mode
///
/// The first worker to stop decides the outcome: an error is returned as is,
/// a clean return while still running is an error too. Shutdown through the
/// running flag is success. Blocked workers are not waited for.
pub struct Supervisor {
    running: Arc<AtomicBool>,
    sender: Sender<Exit>,
    receiver: Receiver<Exit>,
    workers: HashMap<&'static str, JoinHandle<()>>,
}

impl Supervisor {
    /// Supervisor stopping when `running` is cleared
    pub fn new(running: Arc<AtomicBool>) -> Self {
        let (sender, receiver) = channel();
        Self {
            running,
            sender,
            receiver,
            workers: HashMap::new(),
        }
    }

    /// Start `work` on a named thread
    pub fn spawn<F>(&mut self, name: &'static str, work: F) -> Result<()>
    where
        F: FnOnce(&AtomicBool) -> Result<()> + Send + 'static,
    {
        let running = Arc::clone(&self.running);
        let sender = self.sender.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = work(&running);
                let _ = sender.send((name, result));
            })
            .with_context(|| format!("Failed to start {name} worker"))?;
        debug!(worker = name, "Worker started");
        self.workers.insert(name, handle);
        Ok(())
    }

    /// Block until shutdown or the first worker exit
    pub fn wait(mut self) -> Result<()> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                self.join_finished();
                info!("Stopped");
                return Ok(());
            }

            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok((name, result)) => {
                    if let Some(handle) = self.workers.remove(name) {
                        let _ = handle.join();
                    }
                    let stopping = !self.running.load(Ordering::SeqCst);
                    self.running.store(false, Ordering::SeqCst);
                    self.join_finished();
                    return match result {
                        Err(e) => Err(e.context(format!("{name} worker failed"))),
                        Ok(()) if stopping => Ok(()),
                        Ok(()) => Err(anyhow!("{name} worker stopped unexpectedly")),
                    };
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    fn join_finished(&mut self) {
        let finished: Vec<&'static str> = self
            .workers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| *name)
            .collect();
        for name in finished {
            if let Some(handle) = self.workers.remove(name) {
                let _ = handle.join();
                debug!(worker = name, "Worker joined");
            }
        }
    }
}
