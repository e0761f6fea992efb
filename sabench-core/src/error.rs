// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for the sabench listener.
//!
//! Explicit enum error types only. Only [`BindError`] (and configuration
//! errors raised before any socket exists) may abort the service; every
//! per-connection failure is a [`ConnectionError`] that stays with its
//! connection.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the listener service.
#[derive(Debug, Error)]
pub enum ListenerError {
    // =========================================================================
    // Startup Errors - Fatal, Never Retried
    // =========================================================================
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while turning a configured endpoint into a listening socket.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Invalid listen address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Address already in use: {endpoint}")]
    AddressInUse { endpoint: String },

    #[error("Path {path} exists and is not a socket; refusing to replace it")]
    PathCollision { path: PathBuf },

    #[error("Failed to remove stale socket {path}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    /// Classify an OS error returned by `bind`.
    pub fn from_io(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        let endpoint = endpoint.into();
        if source.kind() == std::io::ErrorKind::AddrInUse {
            return Self::AddressInUse { endpoint };
        }
        Self::Io { endpoint, source }
    }
}

/// Outcome of a single connection that did not complete its exchange.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{phase} deadline of {limit:?} exceeded")]
    Timeout {
        phase: &'static str,
        limit: Duration,
    },

    #[error("Connection forcibly closed at drain deadline")]
    DrainTimeout,
}

impl ConnectionError {
    /// Stable label used for the failure metrics.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Io(_) => FailureKind::Io,
            Self::Protocol(_) => FailureKind::Protocol,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::DrainTimeout => FailureKind::DrainTimeout,
        }
    }

    /// True when the peer went away without it being our fault.
    pub fn is_peer_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Self::Protocol(ProtocolError::EmptyRequest) => true,
            _ => false,
        }
    }
}

/// Metric label for a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Io,
    Protocol,
    Timeout,
    DrainTimeout,
}

impl FailureKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Timeout => "timeout",
            Self::DrainTimeout => "drain_timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed or unexpected request bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Peer closed the connection before sending a request")]
    EmptyRequest,

    #[error("Peer closed the connection mid-request after {received} bytes")]
    Truncated { received: usize },

    #[error("Request exceeds maximum size: {size} > {max}")]
    RequestTooLarge { size: usize, max: usize },

    #[error("Malformed request: {reason}")]
    Malformed { reason: String },
}

/// Capture sink and capture file errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture sink is closed")]
    Closed,

    #[error("Capture IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt capture data at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("Capture record checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Hard validation errors are raised before any socket is opened.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid IP address literal: {value}")]
    InvalidIpAddress { value: String },

    #[error("Invalid socket path: {path} - {reason}")]
    InvalidSocketPath { path: PathBuf, reason: String },
}

/// Service lifecycle transition errors.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition listener from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Result type alias using ListenerError.
pub type ListenerResult<T> = Result<T, ListenerError>;
