//! Named worker threads with bounded joins.
//!
//! Every long-lived loop in the daemon and the client runs on a [`Worker`].
//! Stopping a loop is always "poke, then join with a grace period": if the
//! thread does not exit in time it is logged and detached, never escalated.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a spawned, named thread.
#[derive(Debug)]
pub struct Worker {
    name: String,
    handle: JoinHandle<()>,
    /// Disconnects when the thread body returns or unwinds.
    done: Receiver<()>,
}

impl Worker {
    /// Spawn `body` on a new thread called `name`.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                body();
            })
            .map_err(|e| Error::ThreadSpawn(format!("{}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            handle,
            done: done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when called from inside this worker's own thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.handle.thread().id()
    }

    /// Wait up to `timeout` for the thread to finish.
    ///
    /// Returns `true` if it exited. A thread asking to join itself is
    /// detached immediately.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        if self.is_current() {
            log::debug!("{} is joining itself, detaching", self.name);
            return false;
        }

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    log::error!("{} thread panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} thread did not stop within {:?}, detaching",
                    self.name,
                    timeout
                );
                false
            }
        }
    }
}
