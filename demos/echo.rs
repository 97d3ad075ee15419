//! Echo round-trip demonstration.
//!
//! Demonstrates:
//! - Open with a timeout and a subprotocol
//! - Send text and binary payloads and await the replies
//! - Receive timeout on a quiet connection
//! - Close settling an outstanding receive
//!
//! Starts its own local echo server, so no setup is needed.
//!
//! Usage:
//!   cargo run --example echo
//!   cargo run --example echo -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing_subscriber::EnvFilter;

use promised_websocket::{Coordinator, Error, OpenOptions};

// ============================================================================
// Constants
// ============================================================================

const OPEN_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_TIMEOUT: Duration = Duration::from_millis(200);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== Echo ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Starting echo server...");
    let addr = spawn_echo_server().await?;
    println!("        ✓ Listening on {addr}\n");

    let socket = Coordinator::with_default_timeout(Duration::from_secs(1));

    // ========================================================================
    // Open
    // ========================================================================

    println!("[1] Open ws://{addr}...");
    socket
        .open_with(
            format!("ws://{addr}"),
            OpenOptions::new()
                .with_timeout(OPEN_TIMEOUT)
                .with_subprotocol("echo"),
        )
        .await?;
    println!("    ✓ Opened ({})", socket.ready_state());

    // ========================================================================
    // Round Trips
    // ========================================================================

    println!("\n[2] Text round trip...");
    socket.send("hello")?;
    let reply = socket.receive().await?;
    println!("    ✓ Reply: {:?}", reply.as_text());

    println!("\n[3] Binary round trip...");
    socket.send(vec![0xde, 0xad, 0xbe, 0xef])?;
    let reply = socket.receive().await?;
    println!("    ✓ Reply: {:02x?}", reply.as_bytes());

    println!("\n[4] Buffered replies...");
    for i in 0..3 {
        socket.send(format!("burst-{i}"))?;
    }
    for _ in 0..3 {
        let reply = socket.receive().await?;
        println!("    ✓ {:?} (buffered: {})", reply.as_text(), socket.buffered_len());
    }

    // ========================================================================
    // Timeout
    // ========================================================================

    println!("\n[5] Receive on a quiet connection...");
    match socket.receive_with_timeout(QUIET_TIMEOUT).await {
        Err(e @ Error::Timeout { .. }) => println!("    ✓ {e}"),
        other => anyhow::bail!("expected timeout, got {other:?}"),
    }
    println!("    Still open: {}", socket.is_open());

    // ========================================================================
    // Close
    // ========================================================================

    println!("\n[6] Close with a receive outstanding...");
    let receiving = socket.receive_with_timeout(Duration::ZERO);
    socket.close();
    match receiving.await {
        Err(Error::Disconnected) => println!("    ✓ Receive settled: disconnected"),
        other => anyhow::bail!("expected disconnect, got {other:?}"),
    }

    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "promised_websocket=trace"
    } else {
        "promised_websocket=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Accepts the first subprotocol the client offers.
fn select_subprotocol(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .and_then(|first| first.parse().ok());

    if let Some(protocol) = offered {
        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(response)
}

/// Accepts connections and echoes every data frame back.
async fn spawn_echo_server() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, select_subprotocol).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err()
                    {
                        break;
                    }
                }
            });
        }
    });

    Ok(addr)
}
