//! WebSocket transport over tokio-tungstenite.
//!
//! Each connection attempt spawns a tokio task that owns the socket. The
//! handle talks to that task through an unbounded command channel and reads
//! the shared ready state; the task reports lifecycle events through the
//! [`EventSink`].
//!
//! # Event Loop
//!
//! The task:
//!
//! - Performs the handshake (aborted if the handle asks to close first)
//! - Forwards text and binary frames as message events
//! - Writes outgoing payloads in order
//! - Runs the close handshake, bounded by [`CLOSE_TIMEOUT`]
//! - Emits the closed event exactly once on exit
//!
//! Secure (`wss://`) addresses require a TLS feature of tokio-tungstenite;
//! without one the attempt ends with a closed event.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{InvalidHeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, trace, warn};
use url::Url;

use crate::identifiers::ConnectionId;

use super::{
    ConnectRequest, EventSink, Payload, ReadyState, SharedReadyState, Transport, TransportHandle,
};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the close handshake before the socket is dropped.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// RequestError
// ============================================================================

/// Reasons a connect request cannot even be attempted.
#[derive(Debug, Error)]
enum RequestError {
    #[error("invalid address: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported scheme: {0}")]
    Scheme(String),

    #[error("invalid subprotocol list: {0}")]
    Subprotocol(#[from] InvalidHeaderValue),

    #[error("invalid handshake request: {0}")]
    Handshake(#[from] WsError),
}

// ============================================================================
// TungsteniteTransport
// ============================================================================

/// WebSocket client transport.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport {
    /// Protocol limits (message/frame size, buffers).
    config: Option<WebSocketConfig>,
    /// Disable Nagle's algorithm on the TCP socket.
    nodelay: bool,
}

impl TungsteniteTransport {
    /// Creates a transport with tungstenite defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets protocol limits for every connection.
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Disables Nagle's algorithm.
    #[inline]
    #[must_use]
    pub fn with_nodelay(mut self) -> Self {
        self.nodelay = true;
        self
    }
}

impl Transport for TungsteniteTransport {
    fn connect(&self, request: ConnectRequest, events: EventSink) -> Box<dyn TransportHandle> {
        let connection = events.connection_id();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SharedReadyState::new(ReadyState::Connecting));

        match build_request(&request) {
            Ok(ws_request) => {
                debug!(%connection, address = %request.address, "Connecting");
                tokio::spawn(run_connection(
                    ws_request,
                    self.config,
                    self.nodelay,
                    command_rx,
                    Arc::clone(&state),
                    events,
                ));
            }
            Err(e) => {
                warn!(%connection, address = %request.address, error = %e, "Connect request rejected");
                state.set(ReadyState::Closed);
                // Deliver on a later dispatch, never from inside connect
                tokio::spawn(async move { events.closed() });
            }
        }

        Box::new(TungsteniteHandle {
            connection,
            command_tx,
            state,
        })
    }
}

/// Builds the client handshake request for `request`.
fn build_request(request: &ConnectRequest) -> Result<Request, RequestError> {
    let url = Url::parse(&request.address)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(RequestError::Scheme(url.scheme().to_owned()));
    }

    let mut ws_request = url.as_str().into_client_request()?;

    if !request.subprotocols.is_empty() {
        let value = HeaderValue::from_str(&request.subprotocols.join(", "))?;
        ws_request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(ws_request)
}

// ============================================================================
// TungsteniteHandle
// ============================================================================

/// Commands for the connection task.
enum Command {
    Send(Payload),
    Close,
}

struct TungsteniteHandle {
    connection: ConnectionId,
    command_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedReadyState>,
}

impl TransportHandle for TungsteniteHandle {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, payload: Payload) {
        if !self.state.get().is_open() {
            warn!(connection = %self.connection, state = %self.state.get(), "Send on non-open socket dropped");
            return;
        }
        if self.command_tx.send(Command::Send(payload)).is_err() {
            debug!(connection = %self.connection, "Connection task gone, send dropped");
        }
    }

    fn close(&self) {
        let requested = self
            .state
            .transition(ReadyState::Connecting, ReadyState::Closing)
            || self.state.transition(ReadyState::Open, ReadyState::Closing);

        if requested {
            trace!(connection = %self.connection, "Close requested");
            let _ = self.command_tx.send(Command::Close);
        }
    }
}

// ============================================================================
// Connection Task
// ============================================================================

/// Owns one socket from handshake to teardown.
async fn run_connection(
    request: Request,
    config: Option<WebSocketConfig>,
    nodelay: bool,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<SharedReadyState>,
    events: EventSink,
) {
    let connection = events.connection_id();

    // Handshake, unless the handle gives up first
    let ws_stream = tokio::select! {
        result = connect_async_with_config(request, config, nodelay) => match result {
            Ok((stream, response)) => {
                debug!(%connection, status = %response.status(), "WebSocket handshake completed");
                stream
            }
            Err(e) => {
                warn!(%connection, error = %e, "WebSocket connect failed");
                state.set(ReadyState::Closed);
                events.closed();
                return;
            }
        },
        _ = command_rx.recv() => {
            debug!(%connection, "Connection attempt aborted");
            state.set(ReadyState::Closed);
            events.closed();
            return;
        }
    };

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let mut closing = false;
    let mut close_deadline = Instant::now() + CLOSE_TIMEOUT;

    if state.transition(ReadyState::Connecting, ReadyState::Open) {
        events.opened();
    } else {
        // Close was requested while the handshake completed
        closing = true;
        if let Err(e) = ws_write.close().await {
            debug!(%connection, error = %e, "Failed to start close handshake");
        }
    }

    loop {
        tokio::select! {
            // Incoming frames
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        events.message(Payload::Text(text.to_string()));
                    }

                    Some(Ok(Message::Binary(data))) => {
                        events.message(Payload::Binary(data.to_vec()));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(%connection, ?frame, "WebSocket closed by remote");
                        if !closing {
                            closing = true;
                            close_deadline = Instant::now() + CLOSE_TIMEOUT;
                            state.set(ReadyState::Closing);
                        }
                    }

                    Some(Err(e)) => {
                        warn!(%connection, error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!(%connection, "WebSocket stream ended");
                        break;
                    }

                    // Ping, Pong and raw frames are handled by tungstenite
                    Some(Ok(_)) => {}
                }
            }

            // Commands from the handle
            command = command_rx.recv(), if !closing => {
                match command {
                    Some(Command::Send(payload)) => {
                        if let Err(e) = ws_write.send(payload.into_message()).await {
                            warn!(%connection, error = %e, "Failed to send message");
                            break;
                        }
                        trace!(%connection, "Message sent");
                    }

                    Some(Command::Close) | None => {
                        closing = true;
                        close_deadline = Instant::now() + CLOSE_TIMEOUT;
                        state.set(ReadyState::Closing);
                        if let Err(e) = ws_write.close().await {
                            debug!(%connection, error = %e, "Failed to send close frame");
                            break;
                        }
                    }
                }
            }

            () = sleep_until(close_deadline), if closing => {
                debug!(%connection, timeout_ms = u64::try_from(CLOSE_TIMEOUT.as_millis()).unwrap_or(u64::MAX), "Close handshake timed out");
                break;
            }
        }
    }

    state.set(ReadyState::Closed);
    events.closed();

    debug!(%connection, "Connection task terminated");
}

// ============================================================================
// Tests
// ============================================================================
