//! Promised WebSocket - await-style wrapper over an event-driven socket.
//!
//! This library turns the callback lifecycle of a WebSocket connection
//! (opened, message, closed) into futures that can be awaited, with
//! per-operation timeouts and buffering of messages nobody is waiting for.
//!
//! # Architecture
//!
//! The [`Coordinator`] sits between the caller and a [`Transport`]:
//!
//! - **Caller side**: `open`, `send`, `receive`, `close`
//! - **Transport side**: opened, message and closed events
//! - **Timer side**: one timeout guarding the outstanding wait
//!
//! Key design principles:
//!
//! - At most one `open` or `receive` is outstanding; a second is `Busy`
//! - Messages are received in arrival order, none lost, none duplicated
//! - Every wait settles exactly once: success, timeout or disconnect
//! - Transport and timer are traits, so lifecycles are testable by hand
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use promised_websocket::{Coordinator, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = Coordinator::with_default_timeout(Duration::from_secs(5));
//!
//!     socket.open("ws://127.0.0.1:9001").await?;
//!     socket.send("hello")?;
//!
//!     let reply = socket.receive().await?;
//!     println!("Reply: {:?}", reply.as_text());
//!
//!     socket.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`coordinator`] | [`Coordinator`] state machine and its futures |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`timer`] | Timer capability with tokio and manual implementations |
//! | [`transport`] | Transport capability with tungstenite and in-memory implementations |

// ============================================================================
// Modules
// ============================================================================

/// Coordinator state machine.
///
/// Use [`Coordinator::new()`] or [`Coordinator::builder()`] to create one.
pub mod coordinator;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for connections and waits.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Timer capability.
///
/// Schedules and cancels the timeout of the outstanding wait.
pub mod timer;

/// Socket transport capability.
///
/// Connection attempts, outgoing payloads and lifecycle events.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Coordinator types
pub use coordinator::{Coordinator, CoordinatorBuilder, OpenOptions, Pending};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, WaiterId};

// Timer types
pub use timer::{ManualTimer, Timer, TimerCallback, TimerHandle, TokioTimer};

// Transport types
pub use transport::{
    ConnectRequest, EventSink, MemoryPeer, MemoryTransport, Payload, ReadyState, Transport,
    TransportEvent, TransportHandle, TungsteniteTransport,
};
