// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Load generation against a running listener.
//!
//! [`InProcessListener`] starts a listener on the current runtime and
//! [`LoadGenerator`] drives one-exchange connections against it with bounded
//! concurrency, timing each exchange from connect to the peer's close.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sabench_core::{Endpoint, ListenerError, ListenerResult, ListenerService, ShutdownSummary};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Errors raised while setting up or tearing down a benchmark run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Listener stopped before it was listening")]
    NotListening,

    #[error("Task failed: {0}")]
    Join(#[from] JoinError),
}

/// Where the load generator connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl From<Endpoint> for Target {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Tcp(addr) => Target::Tcp(addr),
            Endpoint::Unix(path) => Target::Unix(path),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Tcp(addr) => write!(f, "tcp://{}", addr),
            Target::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Write `request`, half-close, and read until the listener closes.
async fn roundtrip<S>(mut stream: S, request: &[u8]) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await?;
    stream.shutdown().await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

/// One complete exchange on a fresh connection.
pub async fn exchange(target: &Target, request: &[u8]) -> std::io::Result<Vec<u8>> {
    match target {
        Target::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            roundtrip(stream, request).await
        }
        Target::Unix(path) => roundtrip(UnixStream::connect(path).await?, request).await,
    }
}

/// Raw outcome of a load run.
#[derive(Debug, Clone, Default)]
pub struct LoadRun {
    /// Latency of each successful exchange, in nanoseconds.
    pub samples: Vec<u64>,
    pub failures: u64,
    /// Request plus response bytes of successful exchanges.
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Opens `connections` connections, `concurrency` at a time.
#[derive(Debug, Clone)]
pub struct LoadGenerator {
    target: Target,
    connections: u64,
    concurrency: usize,
    warmup: u64,
    request: Arc<Vec<u8>>,
}

impl LoadGenerator {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            connections: 1000,
            concurrency: 16,
            warmup: 50,
            request: Arc::new(b"{\"ping\":true}\n".to_vec()),
        }
    }

    pub fn connections(mut self, connections: u64) -> Self {
        self.connections = connections;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Unmeasured exchanges run before the measurement.
    pub fn warmup(mut self, exchanges: u64) -> Self {
        self.warmup = exchanges;
        self
    }

    /// Request bytes sent on every connection; must suit the listener's processor.
    pub fn request(mut self, request: impl Into<Vec<u8>>) -> Self {
        self.request = Arc::new(request.into());
        self
    }

    pub async fn run(&self) -> Result<LoadRun, HarnessError> {
        for _ in 0..self.warmup {
            let _ = exchange(&self.target, &self.request).await;
        }

        let remaining = Arc::new(AtomicU64::new(self.connections));
        let started = Instant::now();
        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            let target = self.target.clone();
            let request = Arc::clone(&self.request);
            let remaining = Arc::clone(&remaining);
            workers.spawn(async move {
                let mut run = LoadRun::default();
                // Claim one connection at a time until none are left.
                while remaining
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok()
                {
                    let begin = Instant::now();
                    match exchange(&target, &request).await {
                        Ok(response) if !response.is_empty() => {
                            run.samples.push(begin.elapsed().as_nanos() as u64);
                            run.bytes += (request.len() + response.len()) as u64;
                        }
                        _ => run.failures += 1,
                    }
                }
                run
            });
        }

        let mut total = LoadRun::default();
        while let Some(worker) = workers.join_next().await {
            let run = worker?;
            total.samples.extend(run.samples);
            total.failures += run.failures;
            total.bytes += run.bytes;
        }
        total.elapsed = started.elapsed();
        Ok(total)
    }
}

/// A listener running on the current runtime for the duration of a benchmark.
pub struct InProcessListener {
    target: Target,
    token: CancellationToken,
    handle: JoinHandle<ListenerResult<ShutdownSummary>>,
}

impl InProcessListener {
    /// Spawn `service` and wait until it is accepting.
    pub async fn start(service: ListenerService) -> Result<Self, HarnessError> {
        let mut watcher = service.subscribe();
        let token = CancellationToken::new();
        let mut handle = tokio::spawn(service.run(token.clone()));

        match watcher.listening().await {
            Some(endpoint) => Ok(Self {
                target: endpoint.into(),
                token,
                handle,
            }),
            // Stopped without binding; surface the bind error.
            None => match (&mut handle).await? {
                Err(e) => Err(e.into()),
                Ok(_) => Err(HarnessError::NotListening),
            },
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Cancel the listener and wait for its drain to finish.
    pub async fn stop(self) -> Result<ShutdownSummary, HarnessError> {
        self.token.cancel();
        Ok(self.handle.await??)
    }
}
