use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::SqlActionError;

/// Pending result of one submitted action.
///
/// The action is already queued when the handle is returned; awaiting only collects the
/// result. Dropping the handle does not cancel the work.
#[must_use = "the action runs regardless, but its result is lost unless awaited"]
pub struct ActionHandle<T> {
    state: HandleState<T>,
}

enum HandleState<T> {
    Pending(oneshot::Receiver<Result<T, SqlActionError>>),
    Ready(Option<Result<T, SqlActionError>>),
}

impl<T> ActionHandle<T> {
    pub(crate) fn pending(receiver: oneshot::Receiver<Result<T, SqlActionError>>) -> Self {
        Self {
            state: HandleState::Pending(receiver),
        }
    }

    /// A handle that resolves immediately, used for failures detected at submission.
    pub(crate) fn ready(result: Result<T, SqlActionError>) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }
}

// Neither state is self-referential.
impl<T> Unpin for ActionHandle<T> {}

impl<T> Future for ActionHandle<T> {
    type Output = Result<T, SqlActionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Pending(receiver) => Pin::new(receiver).poll(cx).map(|received| {
                received.unwrap_or_else(|_| {
                    Err(SqlActionError::SessionClosed(
                        "session worker stopped before the action ran".into(),
                    ))
                })
            }),
            HandleState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(SqlActionError::ExecutionError(
                    "action handle polled after completion".into(),
                ))
            })),
        }
    }
}

impl<T> std::fmt::Debug for ActionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Pending(_) => "pending",
            HandleState::Ready(Some(_)) => "ready",
            HandleState::Ready(None) => "taken",
        };
        f.debug_struct("ActionHandle").field("state", &state).finish()
    }
}
