// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pluggable request processing.
//!
//! The listener treats a connection as an opaque byte exchange; a
//! [`Processor`] decides where one request ends and what to answer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, ProtocolError};

/// Application logic for one request/response exchange.
pub trait Processor: Send + Sync + 'static {
    /// Length of the first complete request in `buf`, or `None` if more
    /// bytes are needed.
    ///
    /// `buf[..scanned]` was already seen by an earlier call that returned
    /// `None`, so only the tail needs searching.
    fn request_len(&self, buf: &[u8], scanned: usize) -> Result<Option<usize>, ProtocolError>;

    /// Produce the response for one complete request.
    fn process(&self, request: &[u8]) -> Result<Vec<u8>, ProtocolError>;
}

fn newline_terminated(buf: &[u8], scanned: usize) -> Option<usize> {
    let from = scanned.min(buf.len());
    buf[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|idx| from + idx + 1)
}

/// Echoes one newline-terminated line back to the peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineEcho;

impl Processor for LineEcho {
    fn request_len(&self, buf: &[u8], scanned: usize) -> Result<Option<usize>, ProtocolError> {
        Ok(newline_terminated(buf, scanned))
    }

    fn process(&self, request: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Ok(request.to_vec())
    }
}

#[derive(Serialize)]
struct Ack {
    ok: bool,
    bytes: usize,
}

/// Accepts one newline-terminated JSON document and acknowledges it.
///
/// Anything that is not valid JSON is a protocol error.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLineAck;

impl Processor for JsonLineAck {
    fn request_len(&self, buf: &[u8], scanned: usize) -> Result<Option<usize>, ProtocolError> {
        Ok(newline_terminated(buf, scanned))
    }

    fn process(&self, request: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let body = request.strip_suffix(b"\n").unwrap_or(request);
        let body = body.strip_suffix(b"\r").unwrap_or(body);

        serde_json::from_slice::<serde::de::IgnoredAny>(body).map_err(|e| {
            ProtocolError::Malformed {
                reason: format!("invalid JSON: {}", e),
            }
        })?;

        let mut response = serde_json::to_vec(&Ack {
            ok: true,
            bytes: body.len(),
        })
        .map_err(|e| ProtocolError::Malformed {
            reason: e.to_string(),
        })?;
        response.push(b'\n');
        Ok(response)
    }
}

/// Selectable built-in processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    Echo,
    #[default]
    JsonAck,
}

impl ProcessorKind {
    pub fn build(self) -> std::sync::Arc<dyn Processor> {
        match self {
            Self::Echo => std::sync::Arc::new(LineEcho),
            Self::JsonAck => std::sync::Arc::new(JsonLineAck),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::JsonAck => "json-ack",
        }
    }
}

impl FromStr for ProcessorKind {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "echo" => Ok(Self::Echo),
            "json-ack" => Ok(Self::JsonAck),
            other => Err(HardValidationError::InvalidFieldValue {
                field: "processor",
                value: other.to_string(),
                reason: "Expected 'echo' or 'json-ack'".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
