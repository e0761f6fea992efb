// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time, so the listener
//! never sees an address or permission value it cannot bind with.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Which transport binding a listener uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Unix,
}

impl TransportKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated TCP listen address.
///
/// The host part must be an IP literal; hostnames are rejected so that no
/// resolution happens on the bind path. Port 0 asks the OS for an
/// ephemeral port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenAddress(SocketAddr);

impl ListenAddress {
    /// Build from a separate IP string and port, as the CLI receives them.
    pub fn new(ip: &str, port: u16) -> Result<Self, HardValidationError> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| HardValidationError::InvalidIpAddress {
                value: ip.to_string(),
            })?;
        Ok(Self(SocketAddr::new(ip, port)))
    }

    /// Parse a `host:port` string (`[v6]:port` for IPv6).
    pub fn parse(address: &str) -> Result<Self, HardValidationError> {
        address
            .trim()
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| HardValidationError::InvalidIpAddress {
                value: address.to_string(),
            })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// True when the OS will pick the port.
    pub fn is_ephemeral(&self) -> bool {
        self.0.port() == 0
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for ListenAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

/// Permission bits applied to a freshly bound Unix socket path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SocketMode(u32);

impl SocketMode {
    /// Owner and group may connect.
    pub const OWNER_GROUP: SocketMode = SocketMode(0o660);

    pub fn new(mode: u32) -> Result<Self, HardValidationError> {
        if mode > 0o777 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "socket_mode",
                value: format!("{:o}", mode),
                reason: "Only permission bits (0-777 octal) are allowed".to_string(),
            });
        }
        if mode & 0o600 != 0o600 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "socket_mode",
                value: format!("{:o}", mode),
                reason: "Owner must keep read and write access".to_string(),
            });
        }
        Ok(Self(mode))
    }

    /// Parse an octal string such as `"660"` or `"0o660"`.
    pub fn parse_octal(value: &str) -> Result<Self, HardValidationError> {
        let digits = value.trim().trim_start_matches("0o");
        let mode =
            u32::from_str_radix(digits, 8).map_err(|_| HardValidationError::InvalidFieldValue {
                field: "socket_mode",
                value: value.to_string(),
                reason: "Expected an octal permission string".to_string(),
            })?;
        Self::new(mode)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for SocketMode {
    fn default() -> Self {
        Self::OWNER_GROUP
    }
}

impl fmt::Display for SocketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

impl TryFrom<u32> for SocketMode {
    type Error = HardValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SocketMode> for u32 {
    fn from(mode: SocketMode) -> Self {
        mode.0
    }
}

/// Validated Unix socket path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketPath(PathBuf);

impl SocketPath {
    /// `sun_path` holds 108 bytes on Linux including the terminator.
    pub const MAX_LEN: usize = 107;

    pub fn new(path: impl Into<PathBuf>) -> Result<Self, HardValidationError> {
        let path = path.into();
        let len = path.as_os_str().len();
        if len == 0 {
            return Err(HardValidationError::InvalidSocketPath {
                path,
                reason: "Socket path cannot be empty".to_string(),
            });
        }
        if len > Self::MAX_LEN {
            return Err(HardValidationError::InvalidSocketPath {
                path,
                reason: format!("Socket path too long: {} bytes (max {})", len, Self::MAX_LEN),
            });
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SocketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Where a listener is (or will be) reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl Endpoint {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp(_) => TransportKind::Tcp,
            Self::Unix(_) => TransportKind::Unix,
        }
    }

    /// The bound TCP address, if this is a TCP endpoint.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(addr) => Some(*addr),
            Self::Unix(_) => None,
        }
    }

    /// The socket path, if this is a Unix endpoint.
    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Self::Tcp(_) => None,
            Self::Unix(path) => Some(path),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Sequence number assigned at accept time.
///
/// Monotonically increasing per listener; used to correlate log lines and
/// capture records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport-specific identity of the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerIdentity {
    Remote(SocketAddr),
    Local,
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(addr) => write!(f, "{}", addr),
            Self::Local => f.write_str("local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_address_valid() {
        let addr = ListenAddress::new("127.0.0.1", 0).unwrap();
        assert!(addr.is_ephemeral());
        assert!(ListenAddress::new("::1", 9000).is_ok());
        assert!(ListenAddress::parse("0.0.0.0:8080").is_ok());
        assert!(ListenAddress::parse("[::1]:8080").is_ok());
    }

    #[test]
    fn test_listen_address_invalid() {
        assert!(ListenAddress::new("localhost", 80).is_err());
        assert!(ListenAddress::new("", 80).is_err());
        assert!(ListenAddress::new("300.1.1.1", 80).is_err());
        assert!(ListenAddress::parse("localhost:80").is_err());
        assert!(ListenAddress::parse("127.0.0.1").is_err());
    }

    #[test]
    fn test_socket_mode() {
        assert_eq!(SocketMode::default().bits(), 0o660);
        assert_eq!(SocketMode::parse_octal("600").unwrap().bits(), 0o600);
        assert_eq!(SocketMode::parse_octal("0o666").unwrap().bits(), 0o666);
        assert_eq!(SocketMode::OWNER_GROUP.to_string(), "660");
        assert!(SocketMode::parse_octal("999").is_err());
        assert!(SocketMode::new(0o1777).is_err());
        assert!(SocketMode::new(0o060).is_err());
    }

    #[test]
    fn test_socket_path() {
        assert!(SocketPath::new("/tmp/smartgateway").is_ok());
        assert!(SocketPath::new("").is_err());
        assert!(SocketPath::new("/".repeat(200)).is_err());
    }

    #[test]
    fn test_peer_display() {
        assert_eq!(PeerIdentity::Local.to_string(), "local");
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(PeerIdentity::Remote(addr).to_string(), "10.0.0.1:4000");
        assert_eq!(ConnectionId::new(7).to_string(), "#7");
    }
}
