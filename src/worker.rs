//! Named background threads with a shutdown signal
//!
//! Dropping the sender side of a zero-capacity channel is the stop signal:
//! every wait in a worker goes through [`ShutdownSignal`], so a stopped
//! worker wakes immediately instead of sleeping out its interval.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receiving side of a worker's stop signal
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// Wait up to `timeout`; returns `true` if shutdown was requested
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// Non-blocking check
    pub fn is_requested(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// For use in `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// A background thread that returns `T` when stopped
pub struct Worker<T> {
    name: String,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawn `body` on a named thread
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(ShutdownSignal) -> T + Send + 'static,
    {
        let (tx, rx) = bounded::<()>(0);
        let signal = ShutdownSignal { rx };

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(signal))?;

        Ok(Self {
            name: name.to_string(),
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    /// Whether the thread has exited (stopped or panicked)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal the thread and join it
    ///
    /// Returns `None` if the worker was already stopped or panicked.
    pub fn stop(&mut self) -> Option<T> {
        drop(self.shutdown.take());
        let handle = self.handle.take()?;

        match handle.join() {
            Ok(value) => {
                tracing::debug!("Worker {} stopped", self.name);
                Some(value)
            }
            Err(_) => {
                tracing::error!("Worker {} panicked", self.name);
                None
            }
        }
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
