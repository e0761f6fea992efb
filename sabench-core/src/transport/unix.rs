// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Unix domain socket binding.
//!
//! A stale socket left by a crashed run is replaced; anything else at the
//! path is refused. The path is removed again on close.

use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};

use crate::error::BindError;
use crate::transport::Transport;
use crate::types::{Endpoint, PeerIdentity, SocketMode, SocketPath, TransportKind};

/// Upper bound on the connect used to tell a live socket from a stale one.
const LIVENESS_TIMEOUT: Duration = Duration::from_millis(500);

/// What connecting to an existing socket path says about it.
#[derive(Debug)]
enum Liveness {
    /// Somebody owns the socket, even if its backlog is full.
    Live,
    /// Nobody listens; the file is left over from a dead process.
    Stale,
    /// The path disappeared under us.
    Gone,
    /// Cannot tell (e.g. permission denied); never remove on a guess.
    Unknown(io::Error),
}

fn classify_liveness(
    attempt: Result<io::Result<UnixStream>, tokio::time::error::Elapsed>,
) -> Liveness {
    match attempt {
        Ok(Ok(_)) | Err(_) => Liveness::Live,
        Ok(Err(e)) => match e.kind() {
            io::ErrorKind::ConnectionRefused => Liveness::Stale,
            io::ErrorKind::NotFound => Liveness::Gone,
            io::ErrorKind::WouldBlock => Liveness::Live,
            _ => Liveness::Unknown(e),
        },
    }
}

/// Bind parameters for a Unix socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixBindConfig {
    pub path: SocketPath,
    pub mode: SocketMode,
}

impl UnixBindConfig {
    pub fn new(path: SocketPath) -> Self {
        Self {
            path,
            mode: SocketMode::default(),
        }
    }
}

/// Listening Unix domain socket.
#[derive(Debug)]
pub struct UnixTransport {
    listener: Option<UnixListener>,
    path: PathBuf,
}

impl UnixTransport {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove whatever sits at `path` if it is a dead socket.
    async fn clear_stale_socket(path: &Path) -> Result<(), BindError> {
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BindError::from_io(path.display().to_string(), e)),
        };

        if !metadata.file_type().is_socket() {
            return Err(BindError::PathCollision {
                path: path.to_path_buf(),
            });
        }

        let attempt = tokio::time::timeout(LIVENESS_TIMEOUT, UnixStream::connect(path)).await;
        match classify_liveness(attempt) {
            Liveness::Live => Err(BindError::AddressInUse {
                endpoint: path.display().to_string(),
            }),
            Liveness::Gone => Ok(()),
            Liveness::Stale => {
                std::fs::remove_file(path).map_err(|source| BindError::StaleSocket {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "Removed stale socket file");
                Ok(())
            }
            Liveness::Unknown(e) => Err(BindError::from_io(path.display().to_string(), e)),
        }
    }

    fn remove_socket_file(&self) {
        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata) if metadata.file_type().is_socket() => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
                } else {
                    tracing::debug!(path = %self.path.display(), "Removed socket file");
                }
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Socket path replaced by a non-socket; leaving it");
            }
            Err(_) => {}
        }
    }
}

impl Transport for UnixTransport {
    type Stream = UnixStream;
    type BindConfig = UnixBindConfig;

    async fn bind(config: UnixBindConfig) -> Result<Self, BindError> {
        let path = config.path.as_path().to_path_buf();
        Self::clear_stale_socket(&path).await?;

        let listener = UnixListener::bind(&path)
            .map_err(|e| BindError::from_io(path.display().to_string(), e))?;

        let transport = Self {
            listener: Some(listener),
            path,
        };

        // Dropping `transport` on error removes the path again.
        std::fs::set_permissions(
            &transport.path,
            std::fs::Permissions::from_mode(config.mode.bits()),
        )
        .map_err(|e| BindError::from_io(transport.path.display().to_string(), e))?;

        tracing::info!(
            path = %transport.path.display(),
            mode = %config.mode,
            "Unix listener bound"
        );

        Ok(transport)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Unix
    }

    fn local_endpoint(&self) -> Endpoint {
        Endpoint::Unix(self.path.clone())
    }

    async fn accept(&self) -> io::Result<(UnixStream, PeerIdentity)> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))?;
        let (stream, _addr) = listener.accept().await?;
        Ok((stream, PeerIdentity::Local))
    }

    fn close(mut self) {
        // Drop runs the teardown.
        self.listener.take();
        tracing::debug!(path = %self.path.display(), "Unix listener closed");
    }
}

impl Drop for UnixTransport {
    fn drop(&mut self) {
        self.listener.take();
        self.remove_socket_file();
    }
}
