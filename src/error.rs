//! Error types for promised WebSocket operations.
//!
//! Every failure is reported through the returned future or `Result`;
//! nothing is thrown mid-flight and no operation partially applies before
//! failing a precondition.
//!
//! # Usage
//!
//! ```ignore
//! use promised_websocket::{Coordinator, Error, Result};
//!
//! async fn example(socket: &Coordinator) -> Result<()> {
//!     match socket.receive().await {
//!         Ok(payload) => println!("{payload:?}"),
//!         Err(Error::Disconnected) => println!("peer went away"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Precondition | [`Error::AlreadyOpen`], [`Error::NotConnected`], [`Error::NotOpen`], [`Error::Busy`] |
//! | Wait outcome | [`Error::Timeout`], [`Error::Disconnected`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Precondition Errors
    // ========================================================================
    /// `open` called while a connection handle is already held.
    #[error("Connection already open")]
    AlreadyOpen,

    /// `send` called without a ready connection.
    #[error("Not connected")]
    NotConnected,

    /// `receive` called without a ready connection.
    #[error("Connection not open")]
    NotOpen,

    /// Another `open` or `receive` is already awaiting completion.
    #[error("Another operation is already pending")]
    Busy,

    // ========================================================================
    // Wait Outcomes
    // ========================================================================
    /// The configured wait elapsed before the operation settled.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Operation that timed out (`open` or `receive`).
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection closed while a wait was outstanding.
    ///
    /// Covers peer close, transport failure and local `close`.
    #[error("Connection closed")]
    Disconnected,
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the error concerns connection state.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::NotOpen | Self::AlreadyOpen | Self::Disconnected
        )
    }

    /// Returns `true` if the call was rejected before doing anything.
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyOpen | Self::NotConnected | Self::NotOpen | Self::Busy
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry without reopening.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Busy)
    }
}

// ============================================================================
// Tests
// ============================================================================
