//! Promise-style coordination of one WebSocket connection.
//!
//! This module turns the callback-driven lifecycle of a transport into
//! futures the caller can await.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Coordinator`] | State machine behind `open`/`send`/`receive`/`close` |
//! | [`CoordinatorBuilder`] | Fluent configuration builder |
//! | [`OpenOptions`] | Per-call options for `open` |
//! | [`Pending`] | Future returned by `open` and `receive` |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use promised_websocket::{Coordinator, OpenOptions, Result};
//!
//! # async fn example() -> Result<()> {
//! let socket = Coordinator::new();
//!
//! socket
//!     .open_with(
//!         "ws://127.0.0.1:9001",
//!         OpenOptions::new()
//!             .with_timeout(Duration::from_secs(2))
//!             .with_subprotocol("chat"),
//!     )
//!     .await?;
//!
//! let greeting = socket.receive_with_timeout(Duration::from_secs(1)).await?;
//! println!("{greeting:?}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for coordinator configuration.
pub mod builder;

/// Core coordinator implementation.
pub mod core;

/// Per-call options.
pub mod options;

/// Future type for outstanding waits.
pub mod pending;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::CoordinatorBuilder;
pub use core::Coordinator;
pub use options::OpenOptions;
pub use pending::Pending;
