//! Lifecycle events flowing from a transport into the coordinator.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use tracing::trace;

use crate::identifiers::ConnectionId;

use super::Payload;

// ============================================================================
// TransportEvent
// ============================================================================

/// A lifecycle event emitted by a transport handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection became ready.
    Opened,
    /// A message arrived.
    Message(Payload),
    /// The connection closed (gracefully or not), or the attempt failed.
    Closed,
}

/// Receiver of transport events. Implemented by the coordinator.
pub(crate) trait EventListener: Send + Sync {
    fn on_event(&self, connection: ConnectionId, event: TransportEvent);
}

// ============================================================================
// EventSink
// ============================================================================

/// Event channels for one connection attempt.
///
/// Handed to [`Transport::connect`](super::Transport::connect). Holds only a
/// weak reference to the coordinator, so events emitted after it is dropped
/// are discarded.
#[derive(Clone)]
pub struct EventSink {
    listener: Weak<dyn EventListener>,
    connection: ConnectionId,
}

impl EventSink {
    pub(crate) fn new(listener: Weak<dyn EventListener>, connection: ConnectionId) -> Self {
        Self {
            listener,
            connection,
        }
    }

    /// Id of the connection attempt this sink belongs to.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Signals that the connection is ready.
    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    /// Delivers a received message.
    pub fn message(&self, payload: Payload) {
        self.emit(TransportEvent::Message(payload));
    }

    /// Signals that the connection closed or could not be established.
    pub fn closed(&self) {
        self.emit(TransportEvent::Closed);
    }

    /// Delivers an arbitrary event.
    pub fn emit(&self, event: TransportEvent) {
        match self.listener.upgrade() {
            Some(listener) => listener.on_event(self.connection, event),
            None => trace!(connection = %self.connection, ?event, "Listener gone, event dropped"),
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("connection", &self.connection)
            .field("attached", &(self.listener.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(ConnectionId, TransportEvent)>>,
    }

    impl EventListener for Recorder {
        fn on_event(&self, connection: ConnectionId, event: TransportEvent) {
            self.events.lock().push((connection, event));
        }
    }

    #[test]
    fn test_sink_tags_events_with_connection() {
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn EventListener> = recorder.clone();
        let sink = EventSink::new(Arc::downgrade(&listener), ConnectionId::new(4));

        sink.opened();
        sink.message(Payload::from("hi"));
        sink.closed();

        let events = recorder.events.lock();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|(id, _)| *id == ConnectionId::new(4)));
        assert_eq!(events[1].1, TransportEvent::Message(Payload::from("hi")));
    }

    #[test]
    fn test_sink_drops_events_after_listener_gone() {
        let listener: Arc<dyn EventListener> = Arc::new(Recorder::default());
        let sink = EventSink::new(Arc::downgrade(&listener), ConnectionId::new(1));
        drop(listener);

        // Must not panic
        sink.closed();
        assert!(format!("{sink:?}").contains("attached: false"));
    }
}
