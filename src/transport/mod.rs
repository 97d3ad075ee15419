//! Socket transport capability.
//!
//! The coordinator never touches a socket directly. It asks a [`Transport`]
//! to start a connection attempt, keeps the returned [`TransportHandle`], and
//! reacts to the lifecycle events the transport pushes into an [`EventSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   connect / send / close   ┌─────────────────┐
//! │                 │───────────────────────────►│                 │
//! │   Coordinator   │                            │    Transport    │
//! │                 │◄───────────────────────────│                 │
//! └─────────────────┘  opened / message / closed └─────────────────┘
//! ```
//!
//! # Event Contract
//!
//! - Exactly one of `opened` / `closed` concludes a connection attempt.
//! - `message` may fire any number of times while open (or closing).
//! - `closed` fires at most once per handle.
//! - Events are never delivered from inside `connect`, `send` or `close`;
//!   they always arrive on a later dispatch.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `events` | Event sink bound to one connection attempt |
//! | `memory` | In-process transport driven by hand |
//! | `payload` | Message payload type |
//! | `tungstenite` | WebSocket transport over tokio-tungstenite |

// ============================================================================
// Submodules
// ============================================================================

/// Event sink bound to one connection attempt.
pub mod events;

/// In-process transport driven by hand.
pub mod memory;

/// Message payload type.
pub mod payload;

/// WebSocket transport over tokio-tungstenite.
pub mod tungstenite;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Re-exports
// ============================================================================

pub use events::{EventSink, TransportEvent};
pub use memory::{MemoryPeer, MemoryTransport};
pub use payload::Payload;
pub use tungstenite::TungsteniteTransport;

// ============================================================================
// ReadyState
// ============================================================================

/// Lifecycle state reported by a transport handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Connection attempt in progress.
    Connecting = 0,
    /// Connection established, ready to send and receive.
    Open = 1,
    /// Close requested, handshake in progress.
    Closing = 2,
    /// Connection closed or never established.
    Closed = 3,
}

impl ReadyState {
    /// Returns `true` for [`ReadyState::Open`].
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Ready state shared between a handle and the task driving its socket.
#[derive(Debug)]
pub(crate) struct SharedReadyState(AtomicU8);

impl SharedReadyState {
    pub(crate) const fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `next` only if the current state is `current`.
    pub(crate) fn transition(&self, current: ReadyState, next: ReadyState) -> bool {
        self.0
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

// ============================================================================
// ConnectRequest
// ============================================================================

/// Parameters of one connection attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Address to connect to (for WebSocket transports, a `ws://` or `wss://` URL).
    pub address: String,
    /// Subprotocols offered during the handshake, in preference order.
    pub subprotocols: Vec<String>,
}

impl ConnectRequest {
    /// Creates a request without subprotocols.
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            subprotocols: Vec::new(),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Factory for connection attempts.
///
/// `connect` must return immediately. Success or failure of the attempt is
/// reported later through `events`.
pub trait Transport: Send + Sync + 'static {
    /// Starts a connection attempt.
    fn connect(&self, request: ConnectRequest, events: EventSink) -> Box<dyn TransportHandle>;
}

/// A single live (or in-progress) connection.
pub trait TransportHandle: Send + Sync {
    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Queues `payload` for sending. Fire-and-forget.
    fn send(&self, payload: Payload);

    /// Requests a graceful shutdown.
    fn close(&self);
}

// ============================================================================
// Tests
// ============================================================================
