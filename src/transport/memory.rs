//! In-process transport driven by hand.
//!
//! Every connection attempt becomes a [`MemoryPeer`]. Nothing happens on its
//! own: the owner of the peer decides when the connection opens, which
//! messages arrive and when it closes. This makes lifecycle races
//! reproducible in tests and simulations.
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let socket = Coordinator::builder().transport(transport.clone()).build();
//!
//! let opening = socket.open("mem://peer");
//! let peer = transport.last_peer().expect("connect was called");
//! peer.accept();
//! opening.await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::identifiers::ConnectionId;

use super::{
    ConnectRequest, EventSink, Payload, ReadyState, SharedReadyState, Transport, TransportHandle,
};

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport that records connection attempts as [`MemoryPeer`]s.
///
/// Cloning shares the same peer list.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
}

impl MemoryTransport {
    /// Creates a transport with no recorded peers.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All peers created so far, oldest first.
    #[must_use]
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.peers.lock().clone()
    }

    /// The most recent peer.
    #[must_use]
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.peers.lock().last().cloned()
    }

    /// Number of `connect` calls seen.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.peers.lock().len()
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, request: ConnectRequest, events: EventSink) -> Box<dyn TransportHandle> {
        debug!(
            connection = %events.connection_id(),
            address = %request.address,
            "Memory connection requested"
        );

        let peer = MemoryPeer {
            inner: Arc::new(PeerInner {
                request,
                events,
                state: SharedReadyState::new(ReadyState::Connecting),
                sent: Mutex::new(Vec::new()),
                close_requested: AtomicBool::new(false),
                closed_emitted: AtomicBool::new(false),
            }),
        };

        self.peers.lock().push(peer.clone());

        Box::new(MemoryHandle {
            inner: Arc::clone(&peer.inner),
        })
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

struct PeerInner {
    request: ConnectRequest,
    events: EventSink,
    state: SharedReadyState,
    sent: Mutex<Vec<Payload>>,
    close_requested: AtomicBool,
    closed_emitted: AtomicBool,
}

/// The remote side of one in-memory connection attempt.
#[derive(Clone)]
pub struct MemoryPeer {
    inner: Arc<PeerInner>,
}

impl MemoryPeer {
    /// Address passed to `connect`.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.request.address
    }

    /// Subprotocols passed to `connect`.
    #[must_use]
    pub fn subprotocols(&self) -> &[String] {
        &self.inner.request.subprotocols
    }

    /// Connection attempt id.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.inner.events.connection_id()
    }

    /// Current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.get()
    }

    /// Completes the attempt successfully.
    ///
    /// No-op unless the peer is still connecting.
    pub fn accept(&self) {
        if self
            .inner
            .state
            .transition(ReadyState::Connecting, ReadyState::Open)
        {
            self.inner.events.opened();
        }
    }

    /// Delivers a message from the remote side.
    ///
    /// Ignored once the peer is closed.
    pub fn deliver(&self, payload: impl Into<Payload>) {
        if self.inner.state.get() == ReadyState::Closed {
            return;
        }
        self.inner.events.message(payload.into());
    }

    /// Closes the connection from the remote side.
    ///
    /// Also finishes a locally requested close, or refuses a pending attempt.
    /// Emits the closed event at most once.
    pub fn disconnect(&self) {
        self.inner.state.set(ReadyState::Closed);
        if !self.inner.closed_emitted.swap(true, Ordering::AcqRel) {
            self.inner.events.closed();
        }
    }

    /// Payloads the local side has sent, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Payload> {
        self.inner.sent.lock().clone()
    }

    /// `true` once the local side called `close` on its handle.
    #[must_use]
    pub fn close_requested(&self) -> bool {
        self.inner.close_requested.load(Ordering::Acquire)
    }
}

// ============================================================================
// MemoryHandle
// ============================================================================

struct MemoryHandle {
    inner: Arc<PeerInner>,
}

impl TransportHandle for MemoryHandle {
    fn ready_state(&self) -> ReadyState {
        self.inner.state.get()
    }

    fn send(&self, payload: Payload) {
        self.inner.sent.lock().push(payload);
    }

    fn close(&self) {
        self.inner.close_requested.store(true, Ordering::Release);
        if self.inner.state.get() != ReadyState::Closed {
            self.inner.state.set(ReadyState::Closing);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
