// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Round-trip latency of one exchange, TCP vs Unix domain socket.
//!
//! Each iteration opens a fresh connection, sends one line, and waits for the
//! listener to answer and close, so connection setup is part of the cost.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sabench_benchmark::harness::{exchange, InProcessListener};
use sabench_core::capture::FileSink;
use sabench_core::{
    ListenAddress, ListenerConfig, ListenerMetrics, ListenerService, ProcessorKind, SocketPath,
};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Payload sizes, newline included.
const PAYLOAD_SIZES: &[usize] = &[64, 1024, 16384];

fn echo_service(config: ListenerConfig) -> ListenerService {
    ListenerService::new(config, ListenerMetrics::unregistered().expect("metrics"))
        .with_processor(ProcessorKind::Echo.build())
}

fn request(size: usize) -> Vec<u8> {
    let mut request = vec![b'x'; size - 1];
    request.push(b'\n');
    request
}

fn bench_transports(c: &mut Criterion) {
    let runtime = Runtime::new().expect("Failed to build runtime");
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let tcp = runtime
        .block_on(InProcessListener::start(echo_service(ListenerConfig::tcp(
            ListenAddress::new("127.0.0.1", 0).expect("address"),
        ))))
        .expect("Failed to start TCP listener");
    let unix = runtime
        .block_on(InProcessListener::start(echo_service(ListenerConfig::unix(
            SocketPath::new(temp_dir.path().join("bench.sock")).expect("path"),
        ))))
        .expect("Failed to start Unix listener");

    let mut group = c.benchmark_group("listener_roundtrip");
    group.measurement_time(Duration::from_secs(5));

    for &size in PAYLOAD_SIZES {
        let payload = request(size);
        group.throughput(Throughput::Bytes(size as u64));

        for (name, listener) in [("tcp", &tcp), ("unix", &unix)] {
            group.bench_with_input(BenchmarkId::new(name, size), &payload, |b, payload| {
                b.iter(|| {
                    let response = runtime
                        .block_on(exchange(listener.target(), black_box(payload)))
                        .expect("exchange failed");
                    black_box(response);
                });
            });
        }
    }
    group.finish();

    runtime.block_on(async {
        tcp.stop().await.expect("TCP listener failed");
        unix.stop().await.expect("Unix listener failed");
    });
}

/// Cost of the capture sink on the Unix binding.
fn bench_capture_overhead(c: &mut Criterion) {
    let runtime = Runtime::new().expect("Failed to build runtime");
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let (sink, writer) = runtime
        .block_on(FileSink::create(
            temp_dir.path().join("bench.sabcap"),
            ListenerMetrics::unregistered().expect("metrics"),
        ))
        .expect("Failed to create capture file");
    let service = echo_service(ListenerConfig::unix(
        SocketPath::new(temp_dir.path().join("capture.sock")).expect("path"),
    ))
    .with_sink(Arc::new(sink.clone()));
    let listener = runtime
        .block_on(InProcessListener::start(service))
        .expect("Failed to start listener");

    let payload = request(1024);
    c.bench_function("unix_roundtrip_capture_1024", |b| {
        b.iter(|| {
            let response = runtime
                .block_on(exchange(listener.target(), black_box(&payload)))
                .expect("exchange failed");
            black_box(response);
        });
    });

    runtime.block_on(async {
        listener.stop().await.expect("listener failed");
        sink.flush().await.expect("flush failed");
        drop(sink);
        writer.join().await;
    });
}

criterion_group!(benches, bench_transports, bench_capture_overhead);
criterion_main!(benches);
