//! Tokio-backed timer.
//!
//! Each scheduled callback runs on its own task after a `tokio::time::sleep`.
//! Cancellation aborts the task.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tracing::trace;

use super::{Timer, TimerCallback, TimerHandle};

// ============================================================================
// TokioTimer
// ============================================================================

/// Timer running callbacks on the current Tokio runtime.
///
/// Must be used from within a Tokio runtime. Cloning shares the same set of
/// scheduled timers.
#[derive(Clone, Default)]
pub struct TokioTimer {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    tasks: Mutex<FxHashMap<u64, AbortHandle>>,
}

impl TokioTimer {
    /// Creates a timer with nothing scheduled.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks scheduled and not yet fired or cancelled.
    #[inline]
    #[must_use]
    pub fn scheduled_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }
}

impl Timer for TokioTimer {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        // Hold the map lock across spawn so the task cannot remove its
        // entry before it is inserted
        let mut tasks = self.inner.tasks.lock();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.tasks.lock().remove(&id).is_some() {
                trace!(timer = id, "Timer fired");
                callback();
            }
        });
        tasks.insert(id, task.abort_handle());

        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(task) = self.inner.tasks.lock().remove(&handle.id()) {
            task.abort();
            trace!(%handle, "Timer cancelled");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
