//! Dedicated threads for blocking connection checkout.
//!
//! Checkout can block until the driver pool frees a connection. Running it on the caller's
//! runtime, or on a pool that also runs the code which would free that connection, can
//! deadlock; these threads do nothing but checkout.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::SqlActionError;
use crate::session::ActionHandle;

type AcquireJob = Box<dyn FnOnce() + Send>;

/// Fixed set of named threads draining one unbounded job queue.
pub struct AcquisitionExecutor {
    name: String,
    threads: usize,
    sender: Mutex<Option<Sender<AcquireJob>>>,
}

impl AcquisitionExecutor {
    /// Spawn `threads` workers (at least one) named `sql-acquire-{name}-{i}`.
    ///
    /// # Errors
    /// Returns `SqlActionError::AcquisitionError` if a worker thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> Result<Self, SqlActionError> {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::channel::<AcquireJob>();
        let receiver = Arc::new(Mutex::new(receiver));

        for i in 0..threads {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("sql-acquire-{name}-{i}"))
                .spawn(move || run_acquisition_worker(&receiver))
                .map_err(|err| {
                    SqlActionError::AcquisitionError(format!(
                        "failed to spawn acquisition thread: {err}"
                    ))
                })?;
        }
        debug!(datasource = name, threads, "acquisition executor started");

        Ok(Self {
            name: name.to_owned(),
            threads,
            sender: Mutex::new(Some(sender)),
        })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue `work` and return a handle to its result.
    ///
    /// Fails immediately once the executor is shut down.
    pub fn submit<T, F>(&self, work: F) -> ActionHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, SqlActionError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: AcquireJob = Box::new(move || {
            let _ = tx.send(work());
        });

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return ActionHandle::ready(Err(self.shut_down_error()));
        };
        match sender.send(job) {
            Ok(()) => ActionHandle::pending(rx),
            Err(_) => ActionHandle::ready(Err(self.shut_down_error())),
        }
    }

    /// Stop accepting work. Jobs already queued still run; workers then exit.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            debug!(datasource = %self.name, "acquisition executor shut down");
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn shut_down_error(&self) -> SqlActionError {
        SqlActionError::AcquisitionError(format!(
            "acquisition executor for '{}' is shut down",
            self.name
        ))
    }
}

impl Drop for AcquisitionExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AcquisitionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionExecutor")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn run_acquisition_worker(receiver: &Mutex<Receiver<AcquireJob>>) {
    loop {
        // The lock is held only while waiting, never while a job runs.
        let job = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    trace!("acquisition worker exiting");
}
