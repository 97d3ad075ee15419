//! The coordinating state machine.
//!
//! [`Coordinator`] arbitrates between socket lifecycle events pushed by the
//! transport and at most one caller-issued wait (an outstanding `open` or
//! `receive`), including timeout races and buffering of messages that arrive
//! while nobody is waiting.
//!
//! `open`/`receive` are eager: checks and state changes happen when they are
//! called; the returned [`Pending`] only carries the outcome.
//!
//! # Settlement Rules
//!
//! | Waiter | Opened | Message | Closed | Timer |
//! |--------|--------|---------|--------|-------|
//! | none | no-op | buffered | clears connection | no-op |
//! | open | `Ok(())` | buffered | `Disconnected` | `Timeout`, attempt abandoned |
//! | receive | no-op | `Ok(payload)` | `Disconnected` | `Timeout` |
//!
//! Every path that settles a waiter clears the slot and cancels the timer in
//! the same locked step, so no wait is settled twice.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, WaiterId};
use crate::timer::{Timer, TimerHandle};
use crate::transport::events::EventListener;
use crate::transport::{
    ConnectRequest, EventSink, Payload, ReadyState, Transport, TransportEvent, TransportHandle,
};

use super::builder::CoordinatorBuilder;
use super::options::OpenOptions;
use super::pending::Pending;

// ============================================================================
// Helpers
// ============================================================================

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Waiter
// ============================================================================

/// The single in-flight wait.
enum Waiter {
    Open {
        id: WaiterId,
        tx: oneshot::Sender<Result<()>>,
    },
    Receive {
        id: WaiterId,
        tx: oneshot::Sender<Result<Payload>>,
    },
}

impl Waiter {
    fn id(&self) -> WaiterId {
        match self {
            Self::Open { id, .. } | Self::Receive { id, .. } => *id,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Receive { .. } => "receive",
        }
    }

    /// `true` once the caller dropped the matching [`Pending`].
    fn is_abandoned(&self) -> bool {
        match self {
            Self::Open { tx, .. } => tx.is_closed(),
            Self::Receive { tx, .. } => tx.is_closed(),
        }
    }

    fn reject(self, error: Error) {
        // A dropped receiver means nobody is listening any more
        match self {
            Self::Open { tx, .. } => {
                let _ = tx.send(Err(error));
            }
            Self::Receive { tx, .. } => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutable coordinator state. Only touched under [`Shared::state`].
struct State {
    /// Live transport handle, `None` before open and after close.
    connection: Option<Box<dyn TransportHandle>>,
    /// Attempt whose events are currently accepted.
    connection_id: ConnectionId,
    /// Received but not yet consumed, oldest first.
    pending_messages: VecDeque<Payload>,
    waiter: Option<Waiter>,
    /// Timeout guarding `waiter`.
    active_timer: Option<TimerHandle>,
    last_waiter_id: WaiterId,
}

impl State {
    fn new() -> Self {
        Self {
            connection: None,
            connection_id: ConnectionId::default(),
            pending_messages: VecDeque::new(),
            waiter: None,
            active_timer: None,
            last_waiter_id: WaiterId::default(),
        }
    }

    fn is_open(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|handle| handle.ready_state().is_open())
    }

    fn next_waiter_id(&mut self) -> WaiterId {
        self.last_waiter_id = self.last_waiter_id.next();
        self.last_waiter_id
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State plus collaborators, shared by every clone of a [`Coordinator`].
pub(crate) struct Shared {
    state: Mutex<State>,
    transport: Arc<dyn Transport>,
    timer: Arc<dyn Timer>,
    default_timeout: Duration,
}

impl Shared {
    fn cancel_timer(&self, state: &mut State) {
        if let Some(handle) = state.active_timer.take() {
            self.timer.cancel(handle);
        }
    }

    /// Frees the slot if its caller dropped the future.
    fn reclaim_abandoned(&self, state: &mut State) {
        if state.waiter.as_ref().is_some_and(Waiter::is_abandoned) {
            if let Some(waiter) = state.waiter.take() {
                debug!(waiter = %waiter.id(), operation = waiter.operation(), "Abandoned wait reclaimed");
            }
            self.cancel_timer(state);
        }
    }

    /// Schedules the timeout for `waiter`, unless `timeout` is zero.
    fn start_timer(self: &Arc<Self>, waiter: WaiterId, timeout: Duration) -> Option<TimerHandle> {
        if timeout.is_zero() {
            return None;
        }

        let shared = Arc::downgrade(self);
        let handle = self.timer.schedule_after(
            timeout,
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.on_timeout(waiter, timeout);
                }
            }),
        );

        trace!(%waiter, %handle, timeout_ms = millis(timeout), "Timeout scheduled");
        Some(handle)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    fn open(self: &Arc<Self>, address: String, options: OpenOptions) -> Pending<()> {
        let mut state = self.state.lock();

        if state.connection.is_some() {
            debug!(connection = %state.connection_id, "Open rejected: already open");
            return Pending::ready(Err(Error::AlreadyOpen));
        }

        self.reclaim_abandoned(&mut state);
        if state.waiter.is_some() {
            // Previous connection closed locally, its closed event still due
            debug!("Open rejected: previous wait still pending");
            return Pending::ready(Err(Error::Busy));
        }

        let (tx, rx) = oneshot::channel();
        let waiter = state.next_waiter_id();
        state.waiter = Some(Waiter::Open { id: waiter, tx });

        state.connection_id = state.connection_id.next();
        let connection = state.connection_id;

        // Leftovers of the previous connection never reach this one
        if !state.pending_messages.is_empty() {
            debug!(
                %connection,
                discarded = state.pending_messages.len(),
                "Discarding messages buffered on previous connection"
            );
            state.pending_messages.clear();
        }

        info!(%connection, %address, "Opening connection");

        let listener: Arc<dyn EventListener> = self.clone();
        let events = EventSink::new(Arc::downgrade(&listener), connection);
        let request = ConnectRequest {
            address,
            subprotocols: options.subprotocols,
        };
        state.connection = Some(self.transport.connect(request, events));

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        state.active_timer = self.start_timer(waiter, timeout);

        Pending::waiting(rx)
    }

    fn send(&self, payload: Payload) -> Result<()> {
        let state = self.state.lock();

        match &state.connection {
            Some(handle) if handle.ready_state().is_open() => {
                trace!(connection = %state.connection_id, len = payload.len(), "Sending message");
                handle.send(payload);
                Ok(())
            }
            _ => Err(Error::NotConnected),
        }
    }

    fn receive(self: &Arc<Self>, timeout: Option<Duration>) -> Pending<Payload> {
        let mut state = self.state.lock();

        if !state.is_open() {
            return Pending::ready(Err(Error::NotOpen));
        }

        self.reclaim_abandoned(&mut state);
        if state.waiter.is_some() {
            return Pending::ready(Err(Error::Busy));
        }

        if let Some(payload) = state.pending_messages.pop_front() {
            trace!(
                connection = %state.connection_id,
                buffered = state.pending_messages.len(),
                "Receive served from buffer"
            );
            return Pending::ready(Ok(payload));
        }

        let (tx, rx) = oneshot::channel();
        let waiter = state.next_waiter_id();
        state.waiter = Some(Waiter::Receive { id: waiter, tx });

        let timeout = timeout.unwrap_or(self.default_timeout);
        state.active_timer = self.start_timer(waiter, timeout);

        trace!(connection = %state.connection_id, %waiter, "Receive waiting");
        Pending::waiting(rx)
    }

    fn close(&self) {
        let mut state = self.state.lock();

        match state.connection.take() {
            Some(handle) => {
                info!(connection = %state.connection_id, "Closing connection");
                handle.close();
            }
            None => trace!("Close without connection"),
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn on_opened(&self, state: &mut State) {
        match state.waiter.take() {
            Some(Waiter::Open { id, tx }) => {
                self.cancel_timer(state);
                info!(connection = %state.connection_id, waiter = %id, "Connection opened");
                let _ = tx.send(Ok(()));
            }
            other => {
                state.waiter = other;
                warn!(connection = %state.connection_id, "Opened event without open waiter");
            }
        }
    }

    fn on_message(&self, state: &mut State, payload: Payload) {
        state.pending_messages.push_back(payload);

        match state.waiter.take() {
            Some(Waiter::Receive { id, tx }) => match state.pending_messages.pop_front() {
                Some(payload) => {
                    self.cancel_timer(state);
                    trace!(connection = %state.connection_id, waiter = %id, "Message delivered");
                    if let Err(Ok(payload)) = tx.send(Ok(payload)) {
                        // Receiver dropped: keep the message for the next receive
                        debug!(waiter = %id, "Receive abandoned, message kept");
                        state.pending_messages.push_front(payload);
                    }
                }
                None => state.waiter = Some(Waiter::Receive { id, tx }),
            },
            other => {
                state.waiter = other;
                trace!(
                    connection = %state.connection_id,
                    buffered = state.pending_messages.len(),
                    "Message buffered"
                );
            }
        }
    }

    fn on_closed(&self, state: &mut State) {
        state.connection = None;

        match state.waiter.take() {
            Some(waiter) => {
                self.cancel_timer(state);
                info!(
                    connection = %state.connection_id,
                    waiter = %waiter.id(),
                    operation = waiter.operation(),
                    "Connection closed during wait"
                );
                waiter.reject(Error::Disconnected);
            }
            None => info!(
                connection = %state.connection_id,
                buffered = state.pending_messages.len(),
                "Connection closed"
            ),
        }
    }

    fn on_timeout(&self, waiter: WaiterId, timeout: Duration) {
        let mut state = self.state.lock();

        if state.waiter.as_ref().map(Waiter::id) != Some(waiter) {
            trace!(%waiter, "Stale timer ignored");
            return;
        }

        let Some(expired) = state.waiter.take() else {
            return;
        };
        state.active_timer = None;

        let operation = expired.operation();
        let timeout_ms = millis(timeout);
        warn!(
            connection = %state.connection_id,
            %waiter,
            operation,
            timeout_ms,
            "Wait timed out"
        );

        if matches!(expired, Waiter::Open { .. })
            && let Some(handle) = state.connection.take()
        {
            // The attempt failed; let a later open start over
            handle.close();
        }

        expired.reject(Error::timeout(operation, timeout_ms));
    }
}

impl EventListener for Shared {
    fn on_event(&self, connection: ConnectionId, event: TransportEvent) {
        let mut state = self.state.lock();

        if connection != state.connection_id {
            trace!(%connection, current = %state.connection_id, ?event, "Stale event ignored");
            return;
        }

        match event {
            TransportEvent::Opened => self.on_opened(&mut state),
            TransportEvent::Message(payload) => self.on_message(&mut state, payload),
            TransportEvent::Closed => self.on_closed(&mut state),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(handle) = state.active_timer.take() {
            self.timer.cancel(handle);
        }
        if let Some(handle) = state.connection.take() {
            debug!(connection = %state.connection_id, "Coordinator dropped, closing connection");
            handle.close();
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Await-style front end for one event-driven socket connection.
///
/// Cloning is cheap and every clone drives the same connection, so one task
/// can `close` while another awaits `receive`.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use promised_websocket::{Coordinator, Result};
///
/// # async fn example() -> Result<()> {
/// let socket = Coordinator::with_default_timeout(Duration::from_secs(10));
///
/// socket.open("ws://127.0.0.1:9001").await?;
/// socket.send("ping")?;
/// let reply = socket.receive().await?;
/// println!("{reply:?}");
///
/// socket.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

// ============================================================================
// Coordinator - Constructors
// ============================================================================

impl Coordinator {
    /// Creates a WebSocket coordinator without a default timeout.
    ///
    /// Uses the tungstenite transport and the tokio timer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a WebSocket coordinator with a default timeout.
    ///
    /// Zero waits forever.
    #[inline]
    #[must_use]
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self::builder().default_timeout(default_timeout).build()
    }

    /// Starts building a coordinator with custom collaborators.
    #[inline]
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        timer: Arc<dyn Timer>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::new()),
                transport,
                timer,
                default_timeout,
            }),
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Coordinator - Public API
// ============================================================================

impl Coordinator {
    /// Opens a connection to `address` using the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`] if a connection (or attempt) is already held
    /// - [`Error::Busy`] if the previous connection's wait is still pending
    /// - [`Error::Timeout`] if the connection is not ready in time
    /// - [`Error::Disconnected`] if the attempt fails
    pub fn open(&self, address: impl Into<String>) -> Pending<()> {
        self.open_with(address, OpenOptions::new())
    }

    /// Opens a connection to `address` with per-call options.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with(&self, address: impl Into<String>, options: OpenOptions) -> Pending<()> {
        self.shared.open(address.into(), options)
    }

    /// Sends `payload` on the open connection. Never waits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] unless the connection is open.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        self.shared.send(payload.into())
    }

    /// Receives the next message using the default timeout.
    ///
    /// Resolves immediately if a message is already buffered.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] unless the connection is open
    /// - [`Error::Busy`] if another wait is outstanding
    /// - [`Error::Timeout`] if no message arrives in time
    /// - [`Error::Disconnected`] if the connection closes first
    pub fn receive(&self) -> Pending<Payload> {
        self.shared.receive(None)
    }

    /// Receives the next message, waiting at most `timeout`.
    ///
    /// Zero waits forever.
    ///
    /// # Errors
    ///
    /// Same as [`receive`](Self::receive).
    pub fn receive_with_timeout(&self, timeout: Duration) -> Pending<Payload> {
        self.shared.receive(Some(timeout))
    }

    /// Requests the connection to close. Never fails.
    ///
    /// An outstanding wait is settled by the transport's closed event, which
    /// may arrive after this returns.
    pub fn close(&self) {
        self.shared.close();
    }
}

// ============================================================================
// Coordinator - Introspection
// ============================================================================

impl Coordinator {
    /// State of the held connection; [`ReadyState::Closed`] if none.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.shared
            .state
            .lock()
            .connection
            .as_ref()
            .map_or(ReadyState::Closed, |handle| handle.ready_state())
    }

    /// Returns `true` if `send` and `receive` would be accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().is_open()
    }

    /// Number of received messages not yet consumed.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().pending_messages.len()
    }

    /// Returns `true` while an `open` or `receive` is awaiting settlement.
    #[must_use]
    pub fn has_pending_operation(&self) -> bool {
        self.shared
            .state
            .lock()
            .waiter
            .as_ref()
            .is_some_and(|waiter| !waiter.is_abandoned())
    }

    /// Id of the held connection, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        let state = self.shared.state.lock();
        state.connection.as_ref().map(|_| state.connection_id)
    }

    /// Timeout used when a call does not specify one.
    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.shared.default_timeout
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Coordinator")
            .field("connection_id", &state.connection_id)
            .field("connected", &state.connection.is_some())
            .field("buffered", &state.pending_messages.len())
            .field("waiting", &state.waiter.as_ref().map(Waiter::operation))
            .field("default_timeout", &self.shared.default_timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_pending, assert_ready_eq, assert_ready_err, assert_ready_ok, task};

    use crate::timer::{ManualTimer, TimerCallback};
    use crate::transport::{MemoryPeer, MemoryTransport};

    const ADDRESS: &str = "mem://peer";

    struct Harness {
        socket: Coordinator,
        transport: MemoryTransport,
        timer: ManualTimer,
    }

    impl Harness {
        fn new(default_timeout: Duration) -> Self {
            let transport = MemoryTransport::new();
            let timer = ManualTimer::new();
            let socket = Coordinator::builder()
                .default_timeout(default_timeout)
                .transport(transport.clone())
                .timer(timer.clone())
                .build();
            Self {
                socket,
                transport,
                timer,
            }
        }

        fn peer(&self) -> MemoryPeer {
            self.transport.last_peer().expect("connect was called")
        }

        /// Opens and accepts a connection.
        fn connected(default_timeout: Duration) -> (Self, MemoryPeer) {
            let harness = Self::new(default_timeout);
            let mut opening = task::spawn(harness.socket.open(ADDRESS));
            assert_pending!(opening.poll());

            let peer = harness.peer();
            peer.accept();
            assert_ready_ok!(opening.poll());
            (harness, peer)
        }
    }

    /// Timer that ignores cancellation, so every callback can still fire.
    #[derive(Clone, Default)]
    struct LeakyTimer(ManualTimer);

    impl Timer for LeakyTimer {
        fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
            self.0.schedule_after(delay, callback)
        }

        fn cancel(&self, _handle: TimerHandle) {}
    }

    // ========================================================================
    // open
    // ========================================================================

    #[test]
    fn test_open_resolves_when_opened() {
        let h = Harness::new(Duration::ZERO);

        let mut opening = task::spawn(h.socket.open(ADDRESS));
        assert_pending!(opening.poll());
        assert!(h.socket.has_pending_operation());
        assert_eq!(h.socket.ready_state(), ReadyState::Connecting);
        assert_eq!(h.timer.pending_count(), 0);

        let peer = h.peer();
        assert_eq!(peer.address(), ADDRESS);
        peer.accept();

        assert!(opening.is_woken());
        assert_ready_ok!(opening.poll());
        assert!(h.socket.is_open());
        assert!(!h.socket.has_pending_operation());
    }

    #[test]
    fn test_open_passes_subprotocols() {
        let h = Harness::new(Duration::ZERO);

        let _opening = h.socket.open_with(
            ADDRESS,
            OpenOptions::new().with_subprotocols(["chat", "json"]),
        );

        assert_eq!(h.peer().subprotocols(), ["chat", "json"]);
    }

    #[test]
    fn test_open_uses_default_timeout() {
        let h = Harness::new(Duration::from_secs(3));

        let _opening = h.socket.open(ADDRESS);

        assert_eq!(h.timer.pending_delays(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_open_explicit_timeout_overrides_default() {
        let h = Harness::new(Duration::from_secs(3));

        let _opening = h.socket.open_with(
            ADDRESS,
            OpenOptions::new().with_timeout(Duration::from_millis(50)),
        );

        assert_eq!(h.timer.pending_delays(), vec![Duration::from_millis(50)]);
    }

    #[test]
    fn test_open_explicit_zero_waits_forever() {
        let h = Harness::new(Duration::from_secs(3));

        let _opening = h
            .socket
            .open_with(ADDRESS, OpenOptions::new().with_timeout(Duration::ZERO));

        assert_eq!(h.timer.pending_count(), 0);
    }

    #[test]
    fn test_open_success_cancels_timer() {
        let h = Harness::new(Duration::from_secs(1));

        let mut opening = task::spawn(h.socket.open(ADDRESS));
        assert_eq!(h.timer.pending_count(), 1);

        h.peer().accept();
        assert_ready_ok!(opening.poll());
        assert_eq!(h.timer.pending_count(), 0);
    }

    #[test]
    fn test_open_timeout_abandons_attempt() {
        let h = Harness::new(Duration::ZERO);

        let mut opening = task::spawn(
            h.socket
                .open_with(ADDRESS, OpenOptions::new().with_timeout(Duration::from_millis(20))),
        );
        let peer = h.peer();

        assert_eq!(h.timer.fire_all(), 1);
        let err = assert_ready_err!(opening.poll());
        assert_eq!(err, Error::timeout("open", 20));

        assert!(peer.close_requested());
        assert_eq!(h.socket.ready_state(), ReadyState::Closed);

        // A late success of the abandoned attempt changes nothing
        peer.accept();
        assert!(!h.socket.is_open());

        // And a new attempt is allowed
        let mut retry = task::spawn(h.socket.open(ADDRESS));
        assert_eq!(h.transport.connect_count(), 2);
        h.peer().accept();
        assert_ready_ok!(retry.poll());
    }

    #[test]
    fn test_open_refused_is_disconnected() {
        let h = Harness::new(Duration::from_secs(1));

        let mut opening = task::spawn(h.socket.open(ADDRESS));
        h.peer().disconnect();

        assert_ready_eq!(opening.poll(), Err(Error::Disconnected));
        assert_eq!(h.timer.pending_count(), 0);
        assert!(h.socket.connection_id().is_none());
    }

    #[test]
    fn test_open_twice_rejects_second() {
        let h = Harness::new(Duration::ZERO);

        let mut first = task::spawn(h.socket.open(ADDRESS));
        let second = h.socket.open(ADDRESS);
        assert!(second.is_immediate());

        let mut second = task::spawn(second);
        assert_ready_eq!(second.poll(), Err(Error::AlreadyOpen));

        // First attempt unaffected
        assert_eq!(h.transport.connect_count(), 1);
        assert_pending!(first.poll());
        h.peer().accept();
        assert_ready_ok!(first.poll());
    }

    #[test]
    fn test_open_while_open_rejects() {
        let (h, _peer) = Harness::connected(Duration::ZERO);

        let mut again = task::spawn(h.socket.open(ADDRESS));
        assert_ready_eq!(again.poll(), Err(Error::AlreadyOpen));
        assert!(h.socket.is_open());
    }

    // ========================================================================
    // send
    // ========================================================================

    #[test]
    fn test_send_before_open_is_not_connected() {
        let h = Harness::new(Duration::ZERO);
        assert_eq!(h.socket.send("x"), Err(Error::NotConnected));
    }

    #[test]
    fn test_send_while_connecting_is_not_connected() {
        let h = Harness::new(Duration::ZERO);
        let _opening = h.socket.open(ADDRESS);

        assert_eq!(h.socket.send("x"), Err(Error::NotConnected));
        assert!(h.peer().sent().is_empty());
    }

    #[test]
    fn test_send_forwards_payloads_in_order() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        h.socket.send("a").expect("open");
        h.socket.send(vec![1u8, 2]).expect("open");

        assert_eq!(peer.sent(), vec![Payload::from("a"), Payload::from(vec![1u8, 2])]);
    }

    #[test]
    fn test_send_after_close_is_not_connected() {
        let (h, _peer) = Harness::connected(Duration::ZERO);
        h.socket.close();
        assert_eq!(h.socket.send("x"), Err(Error::NotConnected));
    }

    // ========================================================================
    // receive
    // ========================================================================

    #[test]
    fn test_receive_before_open_is_not_open() {
        let h = Harness::new(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive());
        assert_ready_eq!(receiving.poll(), Err(Error::NotOpen));
    }

    #[test]
    fn test_receive_while_connecting_is_not_open() {
        let h = Harness::new(Duration::ZERO);
        let mut opening = task::spawn(h.socket.open(ADDRESS));

        let mut receiving = task::spawn(h.socket.receive());
        assert_ready_eq!(receiving.poll(), Err(Error::NotOpen));

        // Open wait untouched
        h.peer().accept();
        assert_ready_ok!(opening.poll());
    }

    #[test]
    fn test_receive_buffered_resolves_immediately() {
        let (h, peer) = Harness::connected(Duration::from_secs(5));

        peer.deliver("hello");
        assert_eq!(h.socket.buffered_len(), 1);

        let receiving = h.socket.receive();
        assert!(receiving.is_immediate());
        assert_eq!(h.timer.pending_count(), 0);

        let mut receiving = task::spawn(receiving);
        assert_ready_eq!(receiving.poll(), Ok(Payload::from("hello")));
        assert_eq!(h.socket.buffered_len(), 0);
    }

    #[test]
    fn test_receive_live_message_cancels_timer() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive_with_timeout(Duration::from_secs(1)));
        assert_pending!(receiving.poll());
        assert_eq!(h.timer.pending_count(), 1);

        peer.deliver("live");
        assert!(receiving.is_woken());
        assert_ready_eq!(receiving.poll(), Ok(Payload::from("live")));
        assert_eq!(h.timer.pending_count(), 0);
        assert_eq!(h.socket.buffered_len(), 0);
    }

    #[test]
    fn test_receive_times_out() {
        let (h, _peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive_with_timeout(Duration::from_millis(100)));
        assert_pending!(receiving.poll());
        assert_eq!(h.timer.pending_delays(), vec![Duration::from_millis(100)]);

        h.timer.fire_all();
        assert_ready_eq!(receiving.poll(), Err(Error::timeout("receive", 100)));

        // Connection stays usable
        assert!(h.socket.is_open());
        assert!(!h.socket.has_pending_operation());
    }

    #[test]
    fn test_receive_uses_default_timeout() {
        let (h, _peer) = Harness::connected(Duration::from_secs(3));

        let mut receiving = task::spawn(h.socket.receive());
        assert_pending!(receiving.poll());
        assert_eq!(h.timer.pending_delays(), vec![Duration::from_secs(3)]);

        h.timer.fire_all();
        assert_ready_eq!(receiving.poll(), Err(Error::timeout("receive", 3000)));
    }

    #[test]
    fn test_receive_explicit_zero_overrides_default() {
        let (h, _peer) = Harness::connected(Duration::from_secs(3));

        let mut receiving = task::spawn(h.socket.receive_with_timeout(Duration::ZERO));
        assert_pending!(receiving.poll());
        assert_eq!(h.timer.pending_count(), 0);
    }

    #[test]
    fn test_huge_timeout_saturates_millis() {
        let (h, _peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive_with_timeout(Duration::MAX));
        assert_pending!(receiving.poll());

        h.timer.fire_all();
        assert_ready_eq!(receiving.poll(), Err(Error::timeout("receive", u64::MAX)));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_receive_without_timeout_waits_forever() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive());
        assert_pending!(receiving.poll());
        assert_eq!(h.timer.pending_count(), 0);

        peer.deliver("eventually");
        assert_ready_eq!(receiving.poll(), Ok(Payload::from("eventually")));
    }

    #[test]
    fn test_receive_disconnect_rejects() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive_with_timeout(Duration::from_secs(1)));
        assert_pending!(receiving.poll());

        peer.disconnect();
        assert_ready_eq!(receiving.poll(), Err(Error::Disconnected));
        assert_eq!(h.timer.pending_count(), 0);
        assert_eq!(h.socket.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_receive_twice_is_busy() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        let mut first = task::spawn(h.socket.receive());
        let mut second = task::spawn(h.socket.receive());

        assert_ready_eq!(second.poll(), Err(Error::Busy));
        assert_pending!(first.poll());

        peer.deliver("one");
        assert_ready_eq!(first.poll(), Ok(Payload::from("one")));
    }

    #[test]
    fn test_receive_preserves_arrival_order() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        peer.deliver("1");
        peer.deliver("2");

        let mut live = None;
        for expected in ["1", "2", "3"] {
            let mut receiving = task::spawn(h.socket.receive());
            if expected == "3" {
                assert_pending!(receiving.poll());
                peer.deliver("3");
                live = Some(assert_ready_ok!(receiving.poll()));
            } else {
                assert_ready_eq!(receiving.poll(), Ok(Payload::from(expected)));
            }
        }
        assert_eq!(live, Some(Payload::from("3")));
    }

    #[test]
    fn test_dropped_receive_is_reclaimed() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        let abandoned = h.socket.receive_with_timeout(Duration::from_secs(1));
        drop(abandoned);
        assert!(!h.socket.has_pending_operation());

        let mut receiving = task::spawn(h.socket.receive());
        assert_pending!(receiving.poll());
        assert_eq!(h.timer.pending_count(), 0);

        peer.deliver("kept");
        assert_ready_eq!(receiving.poll(), Ok(Payload::from("kept")));
    }

    #[test]
    fn test_message_for_dropped_receive_stays_buffered() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        drop(h.socket.receive());
        peer.deliver("orphan");
        assert_eq!(h.socket.buffered_len(), 1);

        let mut receiving = task::spawn(h.socket.receive());
        assert_ready_eq!(receiving.poll(), Ok(Payload::from("orphan")));
    }

    // ========================================================================
    // close
    // ========================================================================

    #[test]
    fn test_close_never_opened_is_noop() {
        let h = Harness::new(Duration::ZERO);
        h.socket.close();
        h.socket.close();
        assert_eq!(h.transport.connect_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        h.socket.close();
        h.socket.close();

        assert!(peer.close_requested());
        assert_eq!(peer.ready_state(), ReadyState::Closing);
        assert_eq!(h.socket.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_close_settles_receive_via_closed_event() {
        let (h, peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive());
        h.socket.close();

        // Not settled by close itself
        assert_pending!(receiving.poll());

        peer.disconnect();
        assert_ready_eq!(receiving.poll(), Err(Error::Disconnected));
    }

    #[test]
    fn test_buffered_messages_unreachable_after_close() {
        let (h, peer) = Harness::connected(Duration::ZERO);
        peer.deliver("left behind");

        peer.disconnect();
        assert_eq!(h.socket.buffered_len(), 1);

        let mut receiving = task::spawn(h.socket.receive());
        assert_ready_eq!(receiving.poll(), Err(Error::NotOpen));
    }

    #[test]
    fn test_reopen_discards_previous_buffer() {
        let h = Harness::new(Duration::ZERO);

        let mut first = task::spawn(h.socket.open("mem://first"));
        let first_peer = h.peer();
        first_peer.accept();
        assert_ready_ok!(first.poll());

        first_peer.deliver("from-first-server");
        first_peer.disconnect();
        assert_eq!(h.socket.buffered_len(), 1);

        let mut second = task::spawn(h.socket.open("mem://second"));
        assert_eq!(h.socket.buffered_len(), 0);
        let second_peer = h.peer();
        second_peer.accept();
        assert_ready_ok!(second.poll());

        let mut receiving = task::spawn(h.socket.receive());
        assert_pending!(receiving.poll());

        second_peer.deliver("from-second-server");
        assert_ready_eq!(receiving.poll(), Ok(Payload::from("from-second-server")));
    }

    #[test]
    fn test_messages_while_closing_do_not_survive_reopen() {
        let (h, old_peer) = Harness::connected(Duration::ZERO);

        h.socket.close();
        old_peer.deliver("late");
        assert_eq!(h.socket.buffered_len(), 1);

        let mut reopening = task::spawn(h.socket.open(ADDRESS));
        let new_peer = h.peer();
        new_peer.accept();
        assert_ready_ok!(reopening.poll());

        let mut receiving = task::spawn(h.socket.receive());
        assert_pending!(receiving.poll());
        assert_eq!(h.socket.buffered_len(), 0);
    }

    #[test]
    fn test_open_while_previous_close_pending_is_busy() {
        let (h, _peer) = Harness::connected(Duration::ZERO);

        let mut receiving = task::spawn(h.socket.receive());
        h.socket.close();

        let mut reopening = task::spawn(h.socket.open(ADDRESS));
        assert_ready_eq!(reopening.poll(), Err(Error::Busy));
        assert_pending!(receiving.poll());
    }

    #[test]
    fn test_reopen_ignores_stale_events() {
        let (h, old_peer) = Harness::connected(Duration::ZERO);
        h.socket.close();

        let mut reopening = task::spawn(h.socket.open(ADDRESS));
        let new_peer = h.peer();
        assert_ne!(old_peer.connection_id(), new_peer.connection_id());

        // Late events from the first connection
        old_peer.deliver("stale");
        old_peer.disconnect();
        assert_pending!(reopening.poll());
        assert_eq!(h.socket.buffered_len(), 0);

        new_peer.accept();
        assert_ready_ok!(reopening.poll());
        assert_eq!(h.socket.connection_id(), Some(new_peer.connection_id()));
    }

    // ========================================================================
    // timer races
    // ========================================================================

    #[test]
    fn test_missed_cancellation_is_noop() {
        let transport = MemoryTransport::new();
        let timer = LeakyTimer::default();
        let socket = Coordinator::builder()
            .transport(transport.clone())
            .timer(timer.clone())
            .build();

        let mut opening = task::spawn(socket.open_with(
            ADDRESS,
            OpenOptions::new().with_timeout(Duration::from_millis(10)),
        ));
        let peer = transport.last_peer().expect("connect was called");
        peer.accept();
        assert_ready_ok!(opening.poll());

        let mut first = task::spawn(socket.receive_with_timeout(Duration::from_millis(10)));
        peer.deliver("won");
        assert_ready_eq!(first.poll(), Ok(Payload::from("won")));

        let mut second = task::spawn(socket.receive_with_timeout(Duration::from_millis(10)));
        assert_pending!(second.poll());

        // Open timer, first receive timer, second receive timer
        assert_eq!(timer.0.fire_all(), 3);
        assert_ready_eq!(second.poll(), Err(Error::timeout("receive", 10)));
        assert!(socket.is_open());
    }

    #[test]
    fn test_timeout_after_disconnect_is_noop() {
        let transport = MemoryTransport::new();
        let timer = LeakyTimer::default();
        let socket = Coordinator::builder()
            .default_timeout(Duration::from_millis(5))
            .transport(transport.clone())
            .timer(timer.clone())
            .build();

        let mut opening = task::spawn(socket.open(ADDRESS));
        transport.last_peer().expect("connect was called").disconnect();
        assert_ready_eq!(opening.poll(), Err(Error::Disconnected));

        assert_eq!(timer.0.fire_all(), 1);
        assert!(!socket.has_pending_operation());
    }

    // ========================================================================
    // lifetime
    // ========================================================================

    #[test]
    fn test_dropping_coordinator_disconnects_wait() {
        let (h, peer) = Harness::connected(Duration::from_secs(1));

        let mut receiving = task::spawn(h.socket.receive());
        drop(h.socket);

        assert_ready_eq!(receiving.poll(), Err(Error::Disconnected));
        assert!(peer.close_requested());
        assert_eq!(h.timer.pending_count(), 0);

        // Events after the coordinator is gone are ignored
        peer.deliver("nobody home");
        peer.disconnect();
    }

    #[test]
    fn test_clones_share_connection() {
        let (h, peer) = Harness::connected(Duration::ZERO);
        let other = h.socket.clone();

        let mut receiving = task::spawn(h.socket.receive());
        other.close();
        peer.disconnect();

        assert_ready_eq!(receiving.poll(), Err(Error::Disconnected));
        assert!(!other.is_open());
    }

    #[test]
    fn test_debug_output() {
        let (h, _peer) = Harness::connected(Duration::ZERO);
        let _receiving = h.socket.receive();

        let debug = format!("{:?}", h.socket);
        assert!(debug.contains("connected: true"));
        assert!(debug.contains("waiting: Some(\"receive\")"));
    }
}
