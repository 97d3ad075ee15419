//! Future returned by `open` and `receive`.
//!
//! The operation itself runs when it is called; the future only carries its
//! outcome. A precondition failure or a buffered message is available
//! immediately, otherwise the future waits for the single settlement of the
//! installed waiter.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};

// ============================================================================
// Pending
// ============================================================================

enum PendingState<T> {
    /// Settled at call time. `None` once the outcome was taken.
    Ready(Option<Result<T>>),
    /// Waiting for the coordinator to settle the waiter.
    Waiting(oneshot::Receiver<Result<T>>),
}

/// Outcome of an `open` or `receive` call.
///
/// Dropping an unsettled `Pending` abandons the wait; the coordinator
/// reclaims the waiter slot on its next operation or event.
#[must_use = "the outcome of the operation is only observable by awaiting it"]
pub struct Pending<T> {
    state: PendingState<T>,
}

impl<T> Pending<T> {
    /// A future that is already settled.
    pub(crate) fn ready(result: Result<T>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    /// A future that settles when `rx` does.
    pub(crate) fn waiting(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }

    /// Returns `true` if the outcome was known at call time.
    #[inline]
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        matches!(self.state, PendingState::Ready(_))
    }
}

// The outcome is moved out, never pinned in place.
impl<T> Unpin for Pending<T> {}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(result) => {
                // Polled again after completion
                Poll::Ready(result.take().unwrap_or(Err(Error::Disconnected)))
            }
            // Sender dropped: the coordinator went away with the wait outstanding
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|settled| settled.unwrap_or(Err(Error::Disconnected))),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PendingState::Ready(Some(_)) => "ready",
            PendingState::Ready(None) => "taken",
            PendingState::Waiting(_) => "waiting",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_ready_resolves_immediately() {
        let pending = Pending::ready(Ok(7));
        assert!(pending.is_immediate());

        let mut fut = task::spawn(pending);
        assert_ready_eq!(fut.poll(), Ok(7));
    }

    #[test]
    fn test_waiting_resolves_on_send() {
        let (tx, rx) = oneshot::channel();
        let pending = Pending::<u32>::waiting(rx);
        assert!(!pending.is_immediate());

        let mut fut = task::spawn(pending);
        assert_pending!(fut.poll());

        tx.send(Err(Error::Busy)).expect("receiver alive");
        assert!(fut.is_woken());
        assert_ready_eq!(fut.poll(), Err(Error::Busy));
    }

    #[test]
    fn test_dropped_sender_is_disconnected() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        let mut fut = task::spawn(Pending::waiting(rx));
        assert_pending!(fut.poll());

        drop(tx);
        assert_ready_eq!(fut.poll(), Err(Error::Disconnected));
    }

    #[test]
    fn test_debug_shows_state() {
        let (_tx, rx) = oneshot::channel::<Result<()>>();
        assert_eq!(
            format!("{:?}", Pending::waiting(rx)),
            "Pending { state: \"waiting\" }"
        );
    }
}
