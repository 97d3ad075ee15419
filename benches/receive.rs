//! Receive path benchmark suite.
//!
//! Benchmarks the coordinator's receive paths:
//! - Buffered: messages already queued when `receive` is called
//! - Live: `receive` waiting, then a message arrives
//! - Echo: full round trip through a local WebSocket server
//!
//! Run with: cargo bench --bench receive
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::net::SocketAddr;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use promised_websocket::{Coordinator, ManualTimer, MemoryPeer, MemoryTransport};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 64, 1024];

// ============================================================================
// Helpers
// ============================================================================

fn memory_socket() -> (Coordinator, MemoryPeer) {
    let transport = MemoryTransport::new();
    let socket = Coordinator::builder()
        .transport(transport.clone())
        .timer(ManualTimer::new())
        .build();

    let opening = socket.open("mem://bench");
    let peer = transport.last_peer().expect("connect was called");
    peer.accept();
    opening
        .now_or_never()
        .expect("open settled")
        .expect("open succeeded");

    (socket, peer)
}

async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

// ============================================================================
// Benchmark: Buffered Receive
// ============================================================================

fn bench_buffered(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffered_receive");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("drain", batch), &batch, |b, &batch| {
            let (socket, peer) = memory_socket();
            b.iter(|| {
                for i in 0..batch {
                    peer.deliver(format!("m{i}"));
                }
                for _ in 0..batch {
                    let payload = socket.receive().now_or_never().expect("buffered");
                    black_box(payload.expect("payload"));
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Live Receive
// ============================================================================

fn bench_live(c: &mut Criterion) {
    let (socket, peer) = memory_socket();

    c.bench_function("live_receive", |b| {
        b.iter(|| {
            let receiving = socket.receive();
            peer.deliver("live");
            black_box(receiving.now_or_never().expect("delivered").expect("payload"));
        });
    });
}

// ============================================================================
// Benchmark: Echo Round Trip
// ============================================================================

fn bench_echo(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let socket = rt.block_on(async {
        let addr = spawn_echo_server().await;
        let socket = Coordinator::new();
        socket.open(format!("ws://{addr}")).await.expect("open");
        socket
    });

    c.bench_function("echo_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            socket.send("ping").expect("send");
            black_box(socket.receive().await.expect("reply"));
        });
    });

    socket.close();
}

criterion_group!(benches, bench_buffered, bench_live, bench_echo);
criterion_main!(benches);
