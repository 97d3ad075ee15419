//! Timer fired explicitly by the caller.
//!
//! Nothing elapses on its own; [`ManualTimer::fire_all`] runs every scheduled
//! callback. Useful for deterministic tests of timeout races.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Timer, TimerCallback, TimerHandle};

// ============================================================================
// ManualTimer
// ============================================================================

struct Scheduled {
    handle: TimerHandle,
    delay: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    scheduled: Vec<Scheduled>,
}

/// Timer whose callbacks run only when asked to.
#[derive(Clone, Default)]
pub struct ManualTimer {
    inner: Arc<Mutex<Inner>>,
}

impl ManualTimer {
    /// Creates a timer with nothing scheduled.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks scheduled and not yet fired or cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().scheduled.len()
    }

    /// Delays of the scheduled callbacks, oldest first.
    #[must_use]
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .scheduled
            .iter()
            .map(|s| s.delay)
            .collect()
    }

    /// Fires one callback. Returns `false` if it was not scheduled.
    pub fn fire(&self, handle: TimerHandle) -> bool {
        let scheduled = {
            let mut inner = self.inner.lock();
            let index = inner.scheduled.iter().position(|s| s.handle == handle);
            index.map(|i| inner.scheduled.remove(i))
        };

        match scheduled {
            Some(scheduled) => {
                (scheduled.callback)();
                true
            }
            None => false,
        }
    }

    /// Fires every scheduled callback in scheduling order.
    ///
    /// Returns how many fired.
    pub fn fire_all(&self) -> usize {
        let scheduled = std::mem::take(&mut self.inner.lock().scheduled);
        let count = scheduled.len();
        // Lock released: callbacks may schedule or cancel
        for s in scheduled {
            (s.callback)();
        }
        count
    }
}

impl Timer for ManualTimer {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut inner = self.inner.lock();
        let handle = TimerHandle::new(inner.next_id);
        inner.next_id += 1;
        inner.scheduled.push(Scheduled {
            handle,
            delay,
            callback,
        });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.inner.lock().scheduled.retain(|s| s.handle != handle);
    }
}

// ============================================================================
// Tests
// ============================================================================
