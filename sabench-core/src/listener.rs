// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Listener service.
//!
//! Orchestrates one transport binding: bind, accept loop, per-connection
//! tasks, cancellation and bounded drain. The orchestration is written once
//! against [`Transport`] and instantiated for TCP and Unix sockets.
//!
//! Lifecycle: Created → Listening → Draining → Stopped. A failed bind goes
//! straight from Created to Stopped.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::capture::{CaptureSink, NullSink};
use crate::config::{EndpointConfig, ListenerConfig};
use crate::error::{BindError, ConnectionError, ListenerError, ListenerResult};
use crate::handler::{Connection, ConnectionHandler, HandlerLimits, Processor, ProcessorKind};
use crate::metrics::ListenerMetrics;
use crate::state::{LifecycleWatcher, ServiceState, ServiceStateMachine};
use crate::transport::{
    classify_accept_error, AcceptErrorAction, TcpTransport, Transport, UnixBindConfig,
    UnixTransport,
};
use crate::types::{ConnectionId, ListenAddress, SocketPath, TransportKind};

/// Pause after descriptor exhaustion before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What happened while the service ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub accepted: u64,
    pub failed: u64,
    /// Connections closed at the drain deadline.
    pub forced_closed: u64,
}

/// Outcome counters shared by the connection tasks.
#[derive(Debug, Default)]
struct Outcomes {
    failed: AtomicU64,
    forced: AtomicU64,
}

/// A configured, not yet bound listener.
pub struct ListenerService {
    config: ListenerConfig,
    processor: Arc<dyn Processor>,
    sink: Arc<dyn CaptureSink>,
    metrics: ListenerMetrics,
    state: ServiceStateMachine,
}

impl std::fmt::Debug for ListenerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerService")
            .field("config", &self.config)
            .field("capture", &self.sink.is_enabled())
            .field("state", &self.state.state())
            .finish_non_exhaustive()
    }
}

impl ListenerService {
    /// Capture is off and the default processor is used until overridden.
    pub fn new(config: ListenerConfig, metrics: ListenerMetrics) -> Self {
        Self {
            config,
            processor: ProcessorKind::default().build(),
            sink: Arc::new(NullSink),
            metrics,
            state: ServiceStateMachine::new(),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn CaptureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Lifecycle updates, including the bound endpoint once listening.
    pub fn subscribe(&self) -> LifecycleWatcher {
        self.state.subscribe()
    }

    /// Bind and serve until `token` is cancelled and every connection has
    /// finished or been forcibly closed.
    pub async fn run(self, token: CancellationToken) -> ListenerResult<ShutdownSummary> {
        let (service, endpoint) = self.into_serving();
        match endpoint {
            EndpointConfig::Tcp(address) => service.serve::<TcpTransport>(address, token).await,
            EndpointConfig::Unix { path, mode } => {
                service
                    .serve::<UnixTransport>(UnixBindConfig { path, mode }, token)
                    .await
            }
        }
    }

    fn into_serving(self) -> (Serving, EndpointConfig) {
        let Self {
            config,
            processor,
            sink,
            metrics,
            state,
        } = self;

        let handler = ConnectionHandler::new(
            processor,
            sink,
            metrics.clone(),
            HandlerLimits::from(&config),
        );
        let service = Serving {
            state,
            handler,
            metrics,
            drain_timeout: config.drain_timeout,
            outcomes: Arc::new(Outcomes::default()),
        };
        (service, config.endpoint)
    }
}

/// Everything the accept loop and drain need once the config is consumed.
struct Serving {
    state: ServiceStateMachine,
    handler: ConnectionHandler,
    metrics: ListenerMetrics,
    drain_timeout: Option<Duration>,
    outcomes: Arc<Outcomes>,
}

impl Serving {
    async fn serve<T: Transport>(
        mut self,
        bind_config: T::BindConfig,
        token: CancellationToken,
    ) -> ListenerResult<ShutdownSummary> {
        let transport = match T::bind(bind_config).await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(error = %e, "Bind failed");
                self.state.transition_to(ServiceState::Stopped)?;
                return Err(e.into());
            }
        };

        let kind = transport.kind();
        let endpoint = transport.local_endpoint();
        self.state.mark_listening(endpoint.clone())?;
        tracing::info!(transport = kind.as_str(), endpoint = %endpoint, "Listening");

        let tracker = TaskTracker::new();
        let force = CancellationToken::new();
        let mut accepted: u64 = 0;
        let mut fatal: Option<io::Error> = None;

        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = transport.accept() => result,
            };

            match result {
                Ok((stream, peer)) => {
                    accepted += 1;
                    let conn = Connection::new(ConnectionId::new(accepted), peer, stream);
                    tracing::debug!(conn = %conn.id(), peer = %peer, "Accepted connection");
                    self.metrics.connection_accepted(kind);
                    tracker.spawn(run_connection(
                        conn,
                        self.handler.clone(),
                        self.metrics.clone(),
                        kind,
                        force.clone(),
                        self.outcomes.clone(),
                    ));
                }
                Err(e) => {
                    self.metrics.accept_failed(kind);
                    match classify_accept_error(&e) {
                        AcceptErrorAction::Skip => {
                            tracing::debug!(error = %e, "Transient accept error");
                        }
                        AcceptErrorAction::Backoff => {
                            tracing::warn!(
                                error = %e,
                                backoff_ms = ACCEPT_BACKOFF.as_millis() as u64,
                                "Accept failed, backing off"
                            );
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                            }
                        }
                        AcceptErrorAction::Fatal => {
                            tracing::error!(endpoint = %endpoint, error = %e, "Listener failed");
                            fatal = Some(e);
                            break;
                        }
                    }
                }
            }
        }

        self.state.transition_to(ServiceState::Draining)?;
        transport.close();
        tracker.close();
        self.drain(&tracker, &force).await;
        self.state.transition_to(ServiceState::Stopped)?;

        let summary = ShutdownSummary {
            accepted,
            failed: self.outcomes.failed.load(Ordering::Relaxed),
            forced_closed: self.outcomes.forced.load(Ordering::Relaxed),
        };
        tracing::info!(
            endpoint = %endpoint,
            accepted = summary.accepted,
            failed = summary.failed,
            forced_closed = summary.forced_closed,
            "Listener stopped"
        );

        match fatal {
            Some(source) => Err(ListenerError::Io {
                context: "accepting connections",
                source,
            }),
            None => Ok(summary),
        }
    }

    /// Wait for in-flight connections, forcing them closed at the deadline.
    async fn drain(&self, tracker: &TaskTracker, force: &CancellationToken) {
        if !tracker.is_empty() {
            tracing::info!(in_flight = tracker.len(), "Draining connections");
        }

        let Some(limit) = self.drain_timeout else {
            tracker.wait().await;
            return;
        };

        if tokio::time::timeout(limit, tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = tracker.len(),
                limit_ms = limit.as_millis() as u64,
                "Drain deadline reached, closing remaining connections"
            );
            force.cancel();
            tracker.wait().await;
            self.metrics
                .forced_closes(self.outcomes.forced.load(Ordering::Relaxed));
        }
    }
}

/// Body of one connection task.
async fn run_connection<S>(
    conn: Connection<S>,
    handler: ConnectionHandler,
    metrics: ListenerMetrics,
    kind: TransportKind,
    force: CancellationToken,
    outcomes: Arc<Outcomes>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = conn.id();
    let peer = conn.peer();
    let started = Instant::now();

    // Losing the race drops the stream, which closes it.
    let outcome = tokio::select! {
        result = handler.handle(conn) => result,
        _ = force.cancelled() => Err(ConnectionError::DrainTimeout),
    };
    metrics.connection_finished(kind);

    match outcome {
        Ok(exchange) => {
            metrics.observe_exchange(kind, started.elapsed().as_secs_f64());
            tracing::trace!(
                conn = %id,
                request_bytes = exchange.request_bytes,
                response_bytes = exchange.response_bytes,
                "Exchange complete"
            );
        }
        Err(e) => {
            outcomes.failed.fetch_add(1, Ordering::Relaxed);
            if matches!(e, ConnectionError::DrainTimeout) {
                outcomes.forced.fetch_add(1, Ordering::Relaxed);
            }
            metrics.handler_failed(kind, e.kind());
            if e.is_peer_disconnect() {
                tracing::debug!(conn = %id, peer = %peer, error = %e, "Peer disconnected");
            } else {
                tracing::warn!(
                    conn = %id,
                    peer = %peer,
                    kind = e.kind().as_str(),
                    error = %e,
                    "Connection failed"
                );
            }
        }
    }
}

/// Serve `config` until `token` is cancelled.
///
/// `None` for `sink` disables capture.
pub async fn listen(
    token: CancellationToken,
    config: ListenerConfig,
    sink: Option<Arc<dyn CaptureSink>>,
) -> ListenerResult<ShutdownSummary> {
    let metrics = ListenerMetrics::unregistered()?;
    let mut service = ListenerService::new(config, metrics);
    if let Some(sink) = sink {
        service = service.with_sink(sink);
    }
    service.run(token).await
}

/// Serve TCP on `address` (`ip:port`, IP literal only; port 0 is ephemeral).
///
/// The address is validated before anything is bound.
pub async fn listen_tcp(
    token: CancellationToken,
    address: &str,
    sink: Option<Arc<dyn CaptureSink>>,
) -> ListenerResult<ShutdownSummary> {
    let parsed = ListenAddress::parse(address).map_err(|e| BindError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    listen(token, ListenerConfig::tcp(parsed), sink).await
}

/// Serve a Unix domain socket at `path`.
pub async fn listen_unix(
    token: CancellationToken,
    path: impl AsRef<Path>,
    sink: Option<Arc<dyn CaptureSink>>,
) -> ListenerResult<ShutdownSummary> {
    let path = path.as_ref();
    let socket_path = SocketPath::new(path).map_err(|e| BindError::InvalidAddress {
        address: path.display().to_string(),
        reason: e.to_string(),
    })?;
    listen(token, ListenerConfig::unix(socket_path), sink).await
}
