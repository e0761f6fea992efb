// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! TCP/IP binding.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::BindError;
use crate::transport::Transport;
use crate::types::{Endpoint, ListenAddress, PeerIdentity, TransportKind};

/// Listening TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// The bound address; the port is the effective one when 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type BindConfig = ListenAddress;

    async fn bind(address: ListenAddress) -> Result<Self, BindError> {
        let listener = TcpListener::bind(address.socket_addr())
            .await
            .map_err(|e| BindError::from_io(address.to_string(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BindError::from_io(address.to_string(), e))?;

        tracing::info!(
            requested = %address,
            bound = %local_addr,
            ephemeral = address.is_ephemeral(),
            "TCP listener bound"
        );

        Ok(Self {
            listener,
            local_addr,
        })
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn local_endpoint(&self) -> Endpoint {
        Endpoint::Tcp(self.local_addr)
    }

    async fn accept(&self) -> io::Result<(TcpStream, PeerIdentity)> {
        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok((stream, PeerIdentity::Remote(peer)))
    }

    fn close(self) {
        drop(self.listener);
        tracing::debug!(addr = %self.local_addr, "TCP listener closed");
    }
}
