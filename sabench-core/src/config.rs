// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Listener configuration.
//!
//! Tunables come from an optional YAML file validated at boot-up time. Any
//! invalid field results in a HardValidationError before a socket is opened.
//! The endpoint itself is chosen by the entry point and joined with the
//! tunables into an immutable [`ListenerConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, ListenerError, ListenerResult};
use crate::handler::ProcessorKind;
use crate::types::{ListenAddress, SocketMode, SocketPath, TransportKind};

/// Conventional socket path used when the caller does not pick one.
pub const DEFAULT_UNIX_SOCKET_PATH: &str = "/tmp/smartgateway";

/// Default TCP listen address: loopback with an OS-assigned port.
pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:0";

/// Raw tunables as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default = "default_read_timeout_ms")]
    read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    write_timeout_ms: u64,
    #[serde(default = "default_drain_timeout_ms")]
    drain_timeout_ms: u64,
    #[serde(default = "default_max_request_bytes")]
    max_request_bytes: usize,
    #[serde(default = "default_socket_mode")]
    socket_mode: RawMode,
    #[serde(default)]
    processor: ProcessorKind,
}

fn default_read_timeout_ms() -> u64 {
    5000
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_drain_timeout_ms() -> u64 {
    10_000
}

fn default_max_request_bytes() -> usize {
    1024 * 1024 // 1MB
}

fn default_socket_mode() -> RawMode {
    RawMode::Text("660".to_string())
}

/// Octal permission digits, quoted or not (`660` and `"660"` both work).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMode {
    Digits(u32),
    Text(String),
}

impl RawMode {
    fn as_octal_string(&self) -> String {
        match self {
            Self::Digits(digits) => digits.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            max_request_bytes: default_max_request_bytes(),
            socket_mode: default_socket_mode(),
            processor: ProcessorKind::default(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    listener: RawSettings,
}

/// Validated listener tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// `None` waits for in-flight connections without a deadline.
    pub drain_timeout: Option<Duration>,
    pub max_request_bytes: usize,
    pub socket_mode: SocketMode,
    pub processor: ProcessorKind,
}

impl Default for Settings {
    fn default() -> Self {
        // Defaults are known-valid.
        Self {
            read_timeout: Duration::from_millis(default_read_timeout_ms()),
            write_timeout: Duration::from_millis(default_write_timeout_ms()),
            drain_timeout: Some(Duration::from_millis(default_drain_timeout_ms())),
            max_request_bytes: default_max_request_bytes(),
            socket_mode: SocketMode::OWNER_GROUP,
            processor: ProcessorKind::default(),
        }
    }
}

/// Where the listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointConfig {
    Tcp(ListenAddress),
    Unix { path: SocketPath, mode: SocketMode },
}

impl EndpointConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp(_) => TransportKind::Tcp,
            Self::Unix { .. } => TransportKind::Unix,
        }
    }
}

/// Immutable configuration for one listener instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub endpoint: EndpointConfig,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub drain_timeout: Option<Duration>,
    pub max_request_bytes: usize,
}

impl ListenerConfig {
    /// TCP listener with default tunables.
    pub fn tcp(address: ListenAddress) -> Self {
        Self::with_settings(EndpointConfig::Tcp(address), &Settings::default())
    }

    /// Unix listener with default tunables.
    pub fn unix(path: SocketPath) -> Self {
        Self::with_settings(
            EndpointConfig::Unix {
                path,
                mode: SocketMode::OWNER_GROUP,
            },
            &Settings::default(),
        )
    }

    /// Join an endpoint with validated tunables.
    ///
    /// For Unix endpoints the socket mode from `settings` replaces the one
    /// in `endpoint`.
    pub fn with_settings(endpoint: EndpointConfig, settings: &Settings) -> Self {
        let endpoint = match endpoint {
            EndpointConfig::Unix { path, .. } => EndpointConfig::Unix {
                path,
                mode: settings.socket_mode,
            },
            tcp => tcp,
        };
        Self {
            endpoint,
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
            drain_timeout: settings.drain_timeout,
            max_request_bytes: settings.max_request_bytes,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate tunables from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> ListenerResult<Settings> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ListenerError::ConfigNotFound {
                path: PathBuf::from(path),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ListenerError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate tunables from a YAML string.
    pub fn load_string(content: &str) -> ListenerResult<Settings> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ListenerError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Ok(Self::validate(raw.listener)?)
    }

    fn validate(raw: RawSettings) -> Result<Settings, HardValidationError> {
        let read_timeout = Self::validate_timeout("read_timeout_ms", raw.read_timeout_ms)?;
        let write_timeout = Self::validate_timeout("write_timeout_ms", raw.write_timeout_ms)?;

        let drain_timeout = match raw.drain_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        // Min 1 byte, max 64MB
        const MAX_REQUEST_LIMIT: usize = 64 * 1024 * 1024;
        if raw.max_request_bytes == 0 || raw.max_request_bytes > MAX_REQUEST_LIMIT {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_request_bytes",
                value: raw.max_request_bytes.to_string(),
                reason: format!("Must be between 1 and {} bytes", MAX_REQUEST_LIMIT),
            });
        }

        let socket_mode = SocketMode::parse_octal(&raw.socket_mode.as_octal_string())?;

        Ok(Settings {
            read_timeout,
            write_timeout,
            drain_timeout,
            max_request_bytes: raw.max_request_bytes,
            socket_mode,
            processor: raw.processor,
        })
    }

    fn validate_timeout(field: &'static str, ms: u64) -> Result<Duration, HardValidationError> {
        if ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }
        if ms > 300_000 {
            // 5 minutes max
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: ms.to_string(),
                reason: "Timeout must not exceed 5 minutes (300000ms)".to_string(),
            });
        }
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
listener:
  read_timeout_ms: 250
  write_timeout_ms: 500
  drain_timeout_ms: 0
  max_request_bytes: 4096
  socket_mode: "600"
  processor: echo
"#;

    #[test]
    fn test_valid_config() {
        let settings = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(settings.read_timeout, Duration::from_millis(250));
        assert_eq!(settings.write_timeout, Duration::from_millis(500));
        assert_eq!(settings.drain_timeout, None);
        assert_eq!(settings.max_request_bytes, 4096);
        assert_eq!(settings.socket_mode.bits(), 0o600);
        assert_eq!(settings.processor, ProcessorKind::Echo);
    }

    #[test]
    fn test_defaults_applied() {
        let settings = ConfigLoader::load_string("listener: {}\n").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(ConfigLoader::load_string("").unwrap(), Settings::default());
    }

    #[test]
    fn test_unquoted_socket_mode() {
        let settings = ConfigLoader::load_string("listener:\n  socket_mode: 640\n").unwrap();
        assert_eq!(settings.socket_mode.bits(), 0o640);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = ConfigLoader::load_string("listener:\n  read_timeout_ms: 0\n");
        assert!(matches!(result, Err(ListenerError::HardValidation(_))));
    }

    #[test]
    fn test_bad_socket_mode_rejected() {
        let result = ConfigLoader::load_string("listener:\n  socket_mode: \"rwx\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::load_string("listener:\n  read_timeout: 5\n");
        assert!(matches!(result, Err(ListenerError::ConfigParse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_file("/nonexistent/sabench.yaml");
        assert!(matches!(result, Err(ListenerError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_with_settings_applies_socket_mode() {
        let settings = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        let config = ListenerConfig::with_settings(
            EndpointConfig::Unix {
                path: SocketPath::new("/tmp/sabench-test.sock").unwrap(),
                mode: SocketMode::OWNER_GROUP,
            },
            &settings,
        );
        assert!(matches!(
            config.endpoint,
            EndpointConfig::Unix { mode, .. } if mode.bits() == 0o600
        ));
        assert_eq!(config.max_request_bytes, 4096);
    }
}
