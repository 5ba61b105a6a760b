use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::driver::Connection;
use crate::error::SqlActionError;
use crate::metrics::SessionMetric;

use super::SessionState;

pub(crate) type Job = Box<dyn FnOnce(&mut dyn Connection) + Send>;

pub(crate) enum Command {
    Run(Job),
    /// Release the connection once everything queued before it has run.
    Close {
        respond_to: Option<oneshot::Sender<Result<(), SqlActionError>>>,
    },
}

/// Single-consumer FIFO in front of one physical connection.
///
/// A dedicated thread owns the connection and runs jobs one at a time in submission order,
/// so a job's statement and all of its result pages are finished before the next job starts.
pub(crate) struct ActionQueue {
    sender: Sender<Command>,
}

impl ActionQueue {
    pub(crate) fn spawn(
        id: u64,
        conn: Box<dyn Connection>,
        state: Arc<AtomicU8>,
        metric: Option<SessionMetric>,
    ) -> Result<Self, SqlActionError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        thread::Builder::new()
            .name(format!("sql-session-{id}"))
            .spawn(move || run_action_queue(id, conn, &receiver, &state, metric))
            .map_err(|err| {
                SqlActionError::AcquisitionError(format!(
                    "failed to spawn session worker thread: {err}"
                ))
            })?;
        Ok(Self { sender })
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), SqlActionError> {
        self.sender
            .send(command)
            .map_err(|_| SqlActionError::SessionClosed("session worker has stopped".into()))
    }
}

fn run_action_queue(
    id: u64,
    mut conn: Box<dyn Connection>,
    receiver: &Receiver<Command>,
    state: &AtomicU8,
    metric: Option<SessionMetric>,
) {
    let mut respond_to = None;
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Run(job) => job(conn.as_mut()),
            Command::Close { respond_to: reply } => {
                respond_to = reply;
                break;
            }
        }
    }

    // Reached on an explicit close or when every sender is gone.
    let outcome = conn.release();
    state.store(SessionState::Closed as u8, Ordering::Release);
    if let Some(metric) = metric {
        metric.end(outcome.is_ok());
    }
    debug!(session = id, released = outcome.is_ok(), "session closed");

    match respond_to {
        Some(reply) => {
            let _ = reply.send(outcome);
        }
        None => {
            if let Err(err) = outcome {
                warn!(session = id, error = %err, "connection release failed");
            }
        }
    }
}
