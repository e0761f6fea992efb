// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-connection request/response exchange.
//!
//! One accepted connection carries exactly one exchange: read a request
//! (bounded by the read deadline and the size limit), capture it, process
//! it, capture the response, write it back and close. Every error path
//! drops the stream, which closes the connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::capture::{CaptureRecord, CaptureSink};
use crate::config::ListenerConfig;
use crate::error::{ConnectionError, ProtocolError};
use crate::handler::processor::Processor;
use crate::metrics::ListenerMetrics;
use crate::types::{ConnectionId, PeerIdentity};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 8 * 1024;

/// An accepted connection, exclusively owned by the task handling it.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    peer: PeerIdentity,
    stream: S,
}

impl<S> Connection<S> {
    pub fn new(id: ConnectionId, peer: PeerIdentity, stream: S) -> Self {
        Self { id, peer, stream }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> PeerIdentity {
        self.peer
    }
}

/// Sizes of a completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub request_bytes: usize,
    pub response_bytes: usize,
}

/// Limits applied to every exchange.
#[derive(Debug, Clone, Copy)]
pub struct HandlerLimits {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_request_bytes: usize,
}

impl From<&ListenerConfig> for HandlerLimits {
    fn from(config: &ListenerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_request_bytes: config.max_request_bytes,
        }
    }
}

/// Transport-independent connection handler.
///
/// Shared by every connection task of a listener.
#[derive(Clone)]
pub struct ConnectionHandler {
    processor: Arc<dyn Processor>,
    sink: Arc<dyn CaptureSink>,
    metrics: ListenerMetrics,
    limits: HandlerLimits,
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("capture", &self.sink.is_enabled())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandler {
    pub fn new(
        processor: Arc<dyn Processor>,
        sink: Arc<dyn CaptureSink>,
        metrics: ListenerMetrics,
        limits: HandlerLimits,
    ) -> Self {
        Self {
            processor,
            sink,
            metrics,
            limits,
        }
    }

    /// Run one exchange on `conn` and close it.
    pub async fn handle<S>(&self, conn: Connection<S>) -> Result<Exchange, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Connection { id, peer, mut stream } = conn;

        let request = tokio::time::timeout(self.limits.read_timeout, self.read_request(&mut stream))
            .await
            .map_err(|_| ConnectionError::Timeout {
                phase: "read",
                limit: self.limits.read_timeout,
            })??;

        tracing::trace!(conn = %id, peer = %peer, bytes = request.len(), "Request received");
        self.capture(|| CaptureRecord::request(id, request.as_slice()));

        let response = self.processor.process(&request)?;
        self.capture(|| CaptureRecord::response(id, response.as_slice()));

        tokio::time::timeout(self.limits.write_timeout, async {
            stream.write_all(&response).await?;
            stream.flush().await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| ConnectionError::Timeout {
            phase: "write",
            limit: self.limits.write_timeout,
        })??;

        Ok(Exchange {
            request_bytes: request.len(),
            response_bytes: response.len(),
        })
    }

    /// Read until the processor reports one complete request.
    async fn read_request<S>(&self, stream: &mut S) -> Result<Vec<u8>, ConnectionError>
    where
        S: AsyncRead + Unpin,
    {
        let max = self.limits.max_request_bytes;
        let mut buf = Vec::with_capacity(READ_CHUNK.min(max));
        let mut scanned = 0;

        loop {
            if let Some(len) = self.processor.request_len(&buf, scanned)? {
                if len > max {
                    return Err(ProtocolError::RequestTooLarge { size: len, max }.into());
                }
                buf.truncate(len);
                return Ok(buf);
            }
            if buf.len() >= max {
                return Err(ProtocolError::RequestTooLarge {
                    size: buf.len(),
                    max,
                }
                .into());
            }
            scanned = buf.len();

            buf.reserve(READ_CHUNK);
            let n = stream.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(match buf.len() {
                    0 => ProtocolError::EmptyRequest,
                    received => ProtocolError::Truncated { received },
                }
                .into());
            }
        }
    }

    /// Build and emit a record only when capture is on.
    fn capture<F>(&self, record: F)
    where
        F: FnOnce() -> CaptureRecord,
    {
        if !self.sink.is_enabled() {
            return;
        }
        let record = record();
        let connection = record.connection;
        if let Err(e) = self.sink.write(record) {
            self.metrics.capture_write_failed();
            tracing::warn!(conn = %connection, error = %e, "Dropped capture record");
        }
    }
}
