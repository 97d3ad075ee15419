//! Timer capability.
//!
//! The coordinator schedules at most one timeout at a time and cancels it as
//! soon as the wait it guards settles. Implementations must never invoke a
//! callback from inside `schedule_after` or `cancel`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manual` | Timer fired explicitly by the caller |
//! | `runtime` | Tokio-backed timer |

// ============================================================================
// Submodules
// ============================================================================

/// Timer fired explicitly by the caller.
pub mod manual;

/// Tokio-backed timer.
pub mod runtime;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// Re-exports
// ============================================================================

pub use manual::ManualTimer;
pub use runtime::TokioTimer;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle to a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Creates a handle from an implementation-defined id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the implementation-defined id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

// ============================================================================
// Timer
// ============================================================================

/// Schedules and cancels delayed callbacks.
pub trait Timer: Send + Sync + 'static {
    /// Runs `callback` once after `delay`.
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancels a scheduled callback.
    ///
    /// Cancelling a handle that already fired or was already cancelled is a
    /// no-op.
    fn cancel(&self, handle: TimerHandle);
}
