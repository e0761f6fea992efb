// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Transport bindings.
//!
//! TCP and Unix domain sockets share one capability set: bind, accept,
//! close. The listener service is written once against [`Transport`] and
//! instantiated per binding.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::BindError;
use crate::types::{Endpoint, PeerIdentity, TransportKind};

mod tcp;
mod unix;

pub use tcp::TcpTransport;
pub use unix::{UnixBindConfig, UnixTransport};

/// A bound listening resource.
///
/// State machine: Unbound → Bound (`bind`) → Accepting (`accept` calls) →
/// Closed (`close` or drop).
pub trait Transport: Sized + Send + Sync + 'static {
    /// Stream type of an accepted connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// What `bind` needs to know.
    type BindConfig: Send;

    /// Bind the listening resource.
    fn bind(config: Self::BindConfig) -> impl Future<Output = Result<Self, BindError>> + Send;

    fn kind(&self) -> TransportKind;

    /// The effective endpoint, including an OS-assigned port.
    fn local_endpoint(&self) -> Endpoint;

    /// Wait for the next inbound connection.
    ///
    /// Cancel-safe: dropping the future loses no connection.
    fn accept(&self) -> impl Future<Output = io::Result<(Self::Stream, PeerIdentity)>> + Send;

    /// Close the listening resource and release anything bound to it.
    fn close(self);
}

/// How the accept loop should react to an `accept` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorAction {
    /// The failed connection is gone; keep accepting.
    Skip,
    /// Out of descriptors; pause briefly, then keep accepting.
    Backoff,
    /// The listening resource itself is broken.
    Fatal,
}

/// Classify an `accept` error.
pub fn classify_accept_error(error: &io::Error) -> AcceptErrorAction {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptErrorAction::Skip,
        _ => match error.raw_os_error() {
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => {
                AcceptErrorAction::Backoff
            }
            _ => AcceptErrorAction::Fatal,
        },
    }
}
