//! Builder pattern for coordinator configuration.
//!
//! Provides a fluent API for choosing the transport, the timer and the
//! default timeout of a [`Coordinator`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use promised_websocket::{Coordinator, TungsteniteTransport};
//!
//! let socket = Coordinator::builder()
//!     .default_timeout(Duration::from_secs(5))
//!     .transport(TungsteniteTransport::new().with_nodelay())
//!     .build();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::timer::{Timer, TokioTimer};
use crate::transport::{Transport, TungsteniteTransport};

use super::core::Coordinator;

// ============================================================================
// CoordinatorBuilder
// ============================================================================

/// Builder for configuring a [`Coordinator`] instance.
///
/// Use [`Coordinator::builder()`] to create a new builder.
#[derive(Default)]
pub struct CoordinatorBuilder {
    /// Timeout for calls that do not name one. Zero waits forever.
    default_timeout: Duration,
    /// Connection factory. Tungstenite if unset.
    transport: Option<Arc<dyn Transport>>,
    /// Timeout scheduler. Tokio if unset.
    timer: Option<Arc<dyn Timer>>,
}

// ============================================================================
// CoordinatorBuilder Implementation
// ============================================================================

impl CoordinatorBuilder {
    /// Creates a builder with the default collaborators and no timeout.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout used when `open` or `receive` get none.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Wait limit, zero to wait forever
    #[inline]
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the transport connections are opened with.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the timer timeouts are scheduled on.
    #[inline]
    #[must_use]
    pub fn timer(mut self, timer: impl Timer) -> Self {
        self.timer = Some(Arc::new(timer));
        self
    }

    /// Builds the coordinator. Nothing is connected yet.
    #[must_use]
    pub fn build(self) -> Coordinator {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(TungsteniteTransport::new()),
        };
        let timer: Arc<dyn Timer> = match self.timer {
            Some(timer) => timer,
            None => Arc::new(TokioTimer::new()),
        };

        Coordinator::from_parts(transport, timer, self.default_timeout)
    }
}

impl fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("default_timeout", &self.default_timeout)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_timer", &self.timer.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
