// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end tests for the listener service.
//!
//! Real sockets on both transports, driven from client tasks.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sabench_core::capture::{CaptureReader, FileSink, MemorySink};
use sabench_core::{
    BindError, CaptureError, CaptureRecord, CaptureSink, Direction, Endpoint, FailureKind,
    ListenAddress, ListenerConfig, ListenerError, ListenerMetrics, ListenerResult,
    ListenerService, ProcessorKind, ServiceState, ShutdownSummary, SocketPath, TransportKind,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    endpoint: Endpoint,
    token: CancellationToken,
    handle: JoinHandle<ListenerResult<ShutdownSummary>>,
}

impl Running {
    async fn stop(self) -> ListenerResult<ShutdownSummary> {
        self.token.cancel();
        tokio::time::timeout(Duration::from_secs(1), self.handle)
            .await
            .expect("listener did not stop within 1s")
            .expect("listener task panicked")
    }
}

async fn start(service: ListenerService) -> Running {
    let mut watcher = service.subscribe();
    let token = CancellationToken::new();
    let handle = tokio::spawn(service.run(token.clone()));
    let endpoint = watcher.listening().await.expect("listener did not bind");
    Running {
        endpoint,
        token,
        handle,
    }
}

fn tcp_config() -> ListenerConfig {
    ListenerConfig::tcp(ListenAddress::new("127.0.0.1", 0).unwrap())
}

fn unix_config(dir: &TempDir) -> ListenerConfig {
    ListenerConfig::unix(SocketPath::new(dir.path().join("listener.sock")).unwrap())
}

/// One request/response exchange against either binding.
async fn exchange(endpoint: &Endpoint, request: &[u8]) -> Vec<u8> {
    let mut response = Vec::new();
    match endpoint {
        Endpoint::Tcp(addr) => {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(request).await.unwrap();
            stream.read_to_end(&mut response).await.unwrap();
        }
        Endpoint::Unix(path) => {
            let mut stream = UnixStream::connect(path).await.unwrap();
            stream.write_all(request).await.unwrap();
            stream.read_to_end(&mut response).await.unwrap();
        }
    }
    response
}

fn metrics() -> ListenerMetrics {
    ListenerMetrics::unregistered().unwrap()
}

#[tokio::test]
async fn test_ephemeral_port_discoverable_before_first_connection() {
    let running = start(ListenerService::new(tcp_config(), metrics())).await;

    let addr = running.endpoint.tcp_addr().expect("tcp endpoint");
    assert!(addr.port() > 0);

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.accepted, 0);
}

#[tokio::test]
async fn test_stale_unix_socket_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("listener.sock");
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());

    let running = start(ListenerService::new(unix_config(&temp_dir), metrics())).await;
    assert_eq!(running.endpoint.unix_path(), Some(path.as_path()));

    let response = exchange(&running.endpoint, b"[1,2,3]\n").await;
    assert_eq!(response, b"{\"ok\":true,\"bytes\":7}\n");
    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_regular_file_at_unix_path_is_bind_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("listener.sock");
    std::fs::write(&path, b"not a socket").unwrap();

    let token = CancellationToken::new();
    let result = sabench_core::listen_unix(token, &path, None).await;

    assert!(matches!(
        result,
        Err(ListenerError::Bind(BindError::PathCollision { .. }))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), b"not a socket");
}

#[tokio::test]
async fn test_invalid_ip_rejected_before_bind() {
    let token = CancellationToken::new();
    for address in ["not-an-ip:80", "127.0.0.1", "256.0.0.1:80", ""] {
        let result = sabench_core::listen_tcp(token.clone(), address, None).await;
        assert!(
            matches!(
                result,
                Err(ListenerError::Bind(BindError::InvalidAddress { .. }))
            ),
            "{address:?} should be rejected"
        );
    }
}

async fn concurrent_clients_all_handled(config: ListenerConfig) {
    const CLIENTS: usize = 16;

    let metrics = metrics();
    let running = start(ListenerService::new(config, metrics.clone())).await;

    let mut clients = Vec::with_capacity(CLIENTS);
    for i in 0..CLIENTS {
        let endpoint = running.endpoint.clone();
        clients.push(tokio::spawn(async move {
            let request = format!("{{\"client\":{}}}\n", i);
            let response = exchange(&endpoint, request.as_bytes()).await;
            (request.len() - 1, response)
        }));
    }
    for client in clients {
        let (body_len, response) = client.await.unwrap();
        let expected = format!("{{\"ok\":true,\"bytes\":{}}}\n", body_len);
        assert_eq!(String::from_utf8(response).unwrap(), expected);
    }

    let kind = running.endpoint.kind();
    let summary = running.stop().await.unwrap();
    assert_eq!(summary.accepted, CLIENTS as u64);
    assert_eq!(summary.failed, 0);
    assert_eq!(metrics.accepted_total(kind), CLIENTS as u64);
    assert_eq!(metrics.active(kind), 0);
}

#[tokio::test]
async fn test_concurrent_tcp_clients() {
    concurrent_clients_all_handled(tcp_config()).await;
}

#[tokio::test]
async fn test_concurrent_unix_clients() {
    let temp_dir = TempDir::new().unwrap();
    concurrent_clients_all_handled(unix_config(&temp_dir)).await;
}

#[tokio::test]
async fn test_failing_connection_does_not_affect_others() {
    let config = tcp_config().with_drain_timeout(Some(Duration::from_millis(100)));
    let metrics = metrics();
    let running = start(ListenerService::new(config, metrics.clone())).await;

    // Sends nothing; others must not wait on it.
    let Endpoint::Tcp(addr) = running.endpoint else {
        panic!("tcp endpoint expected");
    };
    let _stalled = TcpStream::connect(addr).await.unwrap();

    let bad = exchange(&running.endpoint, b"{oops\n").await;
    assert!(bad.is_empty());
    let good = exchange(&running.endpoint, b"true\n").await;
    assert_eq!(good, b"{\"ok\":true,\"bytes\":4}\n");

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(metrics.failures(TransportKind::Tcp, FailureKind::Protocol), 1);
    assert_eq!(
        metrics.failures(TransportKind::Tcp, FailureKind::DrainTimeout),
        1
    );
}

#[tokio::test]
async fn test_read_deadline_and_size_limit_close_only_offenders() {
    let config = tcp_config()
        .with_read_timeout(Duration::from_millis(100))
        .with_max_request_bytes(16);
    let metrics = metrics();
    let running = start(ListenerService::new(config, metrics.clone())).await;
    let Endpoint::Tcp(addr) = running.endpoint else {
        panic!("tcp endpoint expected");
    };

    let mut silent = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
        .await
        .expect("server must close after the read deadline")
        .unwrap_or(0);
    assert_eq!(n, 0);

    // No newline within the limit; the server may reset instead of closing.
    let mut oversized = TcpStream::connect(addr).await.unwrap();
    oversized.write_all(&[b'7'; 64]).await.unwrap();
    let mut reply = Vec::new();
    let _ = oversized.read_to_end(&mut reply).await;
    assert!(reply.is_empty());

    let good = exchange(&running.endpoint, b"1\n").await;
    assert_eq!(good, b"{\"ok\":true,\"bytes\":1}\n");

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(metrics.failures(TransportKind::Tcp, FailureKind::Timeout), 1);
    assert_eq!(metrics.failures(TransportKind::Tcp, FailureKind::Protocol), 1);
}

#[tokio::test]
async fn test_cancel_while_blocked_in_accept_removes_unix_path() {
    let temp_dir = TempDir::new().unwrap();
    let service = ListenerService::new(unix_config(&temp_dir), metrics());
    let watcher = service.subscribe();
    let running = start(service).await;
    let path: PathBuf = running.endpoint.unix_path().unwrap().to_path_buf();
    assert!(path.exists());

    let started = std::time::Instant::now();
    running.stop().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!path.exists());
    assert_eq!(watcher.current().state, ServiceState::Stopped);
}

async fn run_single_capture(capture_path: &Path) {
    let metrics = metrics();
    let (sink, writer) = FileSink::create(capture_path, metrics.clone()).await.unwrap();
    let service = ListenerService::new(tcp_config(), metrics).with_sink(Arc::new(sink.clone()));
    let running = start(service).await;

    let response = exchange(&running.endpoint, b"{\"k\":\"v\"}\n").await;
    running.stop().await.unwrap();

    sink.flush().await.unwrap();
    drop(sink);
    writer.join().await;
    assert_eq!(response, b"{\"ok\":true,\"bytes\":9}\n");
}

#[tokio::test]
async fn test_capture_holds_request_then_response() {
    let temp_dir = TempDir::new().unwrap();
    let capture_path = temp_dir.path().join("exchange.cap");
    run_single_capture(&capture_path).await;

    let records: Vec<_> = CaptureReader::open(&capture_path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].direction, Direction::Request);
    assert_eq!(records[0].payload, b"{\"k\":\"v\"}\n");
    assert_eq!(records[1].direction, Direction::Response);
    assert_eq!(records[1].payload, b"{\"ok\":true,\"bytes\":9}\n");
    assert_eq!(records[0].connection, records[1].connection);
}

#[tokio::test]
async fn test_capture_keeps_per_connection_order_under_load() {
    let sink = MemorySink::new();
    let service = ListenerService::new(tcp_config(), metrics()).with_sink(Arc::new(sink.clone()));
    let running = start(service).await;

    let mut clients = Vec::new();
    for i in 0..8 {
        let endpoint = running.endpoint.clone();
        clients.push(tokio::spawn(async move {
            exchange(&endpoint, format!("{}\n", i).as_bytes()).await
        }));
    }
    for client in clients {
        client.await.unwrap();
    }
    running.stop().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 16);
    for record in records.iter().filter(|r| r.direction == Direction::Response) {
        let request_pos = records
            .iter()
            .position(|r| r.connection == record.connection && r.direction == Direction::Request)
            .expect("request recorded");
        let response_pos = records
            .iter()
            .position(|r| std::ptr::eq(r, record))
            .unwrap();
        assert!(request_pos < response_pos);
    }
}

/// Disabled sink that still records whether anyone wrote to it.
#[derive(Clone, Default)]
struct CountingDisabledSink {
    writes: Arc<AtomicUsize>,
}

impl CaptureSink for CountingDisabledSink {
    fn write(&self, _record: CaptureRecord) -> Result<(), CaptureError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_disabled_capture_writes_nothing() {
    let socket_dir = TempDir::new().unwrap();
    let sink = CountingDisabledSink::default();
    let service = ListenerService::new(unix_config(&socket_dir), metrics())
        .with_sink(Arc::new(sink.clone()));
    let running = start(service).await;

    for _ in 0..3 {
        let response = exchange(&running.endpoint, b"null\n").await;
        assert_eq!(response, b"{\"ok\":true,\"bytes\":4}\n");
    }
    running.stop().await.unwrap();

    assert_eq!(sink.writes.load(Ordering::SeqCst), 0);
    // Only the socket was ever created there, and it is gone.
    assert_eq!(std::fs::read_dir(socket_dir.path()).unwrap().count(), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_capture_device_failure_is_counted() {
    let metrics = metrics();
    let (sink, writer) = FileSink::create("/dev/full", metrics.clone())
        .await
        .unwrap();
    let service = ListenerService::new(tcp_config(), metrics.clone())
        .with_processor(ProcessorKind::Echo.build())
        .with_sink(Arc::new(sink.clone()));
    let running = start(service).await;

    let mut request = vec![b'x'; 100 * 1024];
    request.push(b'\n');
    let response = exchange(&running.endpoint, &request).await;
    assert_eq!(response, request);
    running.stop().await.unwrap();

    assert!(sink.flush().await.is_err());
    // Request and response both lost.
    assert_eq!(metrics.capture_failures_total(), 2);

    drop(sink);
    writer.join().await;
}

#[tokio::test]
async fn test_drain_deadline_forces_remaining_connections_closed() {
    let config = tcp_config().with_drain_timeout(Some(Duration::from_millis(100)));
    let metrics = metrics();
    let running = start(ListenerService::new(config, metrics.clone())).await;

    let Endpoint::Tcp(addr) = running.endpoint else {
        panic!("tcp endpoint expected");
    };
    let mut idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.forced_closed, 1);
    assert_eq!(
        metrics.failures(TransportKind::Tcp, FailureKind::DrainTimeout),
        1
    );

    // The server side is gone.
    let mut buf = [0u8; 16];
    let n = idle.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}
