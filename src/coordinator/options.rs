//! Per-call options for opening a connection.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use promised_websocket::OpenOptions;
//!
//! let options = OpenOptions::new()
//!     .with_timeout(Duration::from_secs(5))
//!     .with_subprotocol("graphql-ws");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// OpenOptions
// ============================================================================

/// Options for a single `open` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Wait limit for this call. `None` uses the coordinator default;
    /// zero waits forever.
    pub timeout: Option<Duration>,

    /// Subprotocols offered during the handshake, in preference order.
    pub subprotocols: Vec<String>,
}

impl OpenOptions {
    /// Creates options using the coordinator defaults.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: None,
            subprotocols: Vec::new(),
        }
    }

    /// Sets the wait limit for this call.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends one subprotocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    /// Appends several subprotocols.
    #[inline]
    #[must_use]
    pub fn with_subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols
            .extend(protocols.into_iter().map(Into::into));
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
