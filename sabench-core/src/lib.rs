// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sabench Core Library
//!
//! Transport-agnostic listener service for benchmarking a request/response
//! protocol over TCP and Unix domain sockets. Provides the transport
//! bindings, connection handler, capture sink, lifecycle state machine,
//! configuration parsing and Prometheus instruments.

pub mod capture;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod metrics;
pub mod state;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use capture::{
    CaptureReader, CaptureRecord, CaptureSink, Direction, FileSink, MemorySink, NullSink,
};
pub use config::{ConfigLoader, EndpointConfig, ListenerConfig, Settings};
pub use error::{
    BindError, CaptureError, ConnectionError, FailureKind, HardValidationError, ListenerError,
    ListenerResult, ProtocolError,
};
pub use handler::{ConnectionHandler, Processor, ProcessorKind};
pub use listener::{listen, listen_tcp, listen_unix, ListenerService, ShutdownSummary};
pub use metrics::ListenerMetrics;
pub use state::{LifecycleWatcher, ServiceState};
pub use types::{ConnectionId, Endpoint, ListenAddress, SocketMode, SocketPath, TransportKind};
