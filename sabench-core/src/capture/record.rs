// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Capture record framing.
//!
//! File layout: the 8-byte [`CAPTURE_MAGIC`] followed by records. Each record
//! is a fixed little-endian header and the raw payload:
//!
//! ```text
//! +-----------+-----------+-----------+-----------+----------------+
//! | seq: u64  | dir: u8   | len: u32  | crc: u32  | payload (len)  |
//! +-----------+-----------+-----------+-----------+----------------+
//! ```
//!
//! Payloads are arbitrary bytes, so boundaries come from the length field,
//! never from delimiters.

use crate::error::CaptureError;
use crate::types::ConnectionId;

/// Magic bytes at the start of every capture file.
pub const CAPTURE_MAGIC: &[u8; 8] = b"SABCAP01";

/// Size of the per-record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 8 + 1 + 4 + 4;

/// Which half of the exchange a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    const fn to_byte(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::Response => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical unit of captured traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub connection: ConnectionId,
    pub direction: Direction,
    pub payload: Vec<u8>,
}

impl CaptureRecord {
    pub fn request(connection: ConnectionId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            connection,
            direction: Direction::Request,
            payload: payload.into(),
        }
    }

    pub fn response(connection: ConnectionId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            connection,
            direction: Direction::Response,
            payload: payload.into(),
        }
    }

    /// Total encoded size including the header.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }

    /// Encode the header for this record.
    pub fn header(&self) -> Result<[u8; RECORD_HEADER_SIZE], CaptureError> {
        let len = u32::try_from(self.payload.len()).map_err(|_| CaptureError::Corrupt {
            offset: 0,
            reason: format!("payload of {} bytes does not fit a record", self.payload.len()),
        })?;

        let mut header = [0u8; RECORD_HEADER_SIZE];
        header[0..8].copy_from_slice(&self.connection.value().to_le_bytes());
        header[8] = self.direction.to_byte();
        header[9..13].copy_from_slice(&len.to_le_bytes());
        header[13..17].copy_from_slice(&crc32fast::hash(&self.payload).to_le_bytes());
        Ok(header)
    }

    /// Append the full encoded record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), CaptureError> {
        out.extend_from_slice(&self.header()?);
        out.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub connection: ConnectionId,
    pub direction: Direction,
    pub length: u32,
    pub checksum: u32,
}

impl RecordHeader {
    pub(crate) fn decode(bytes: &[u8; RECORD_HEADER_SIZE], offset: u64) -> Result<Self, CaptureError> {
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[0..8]);
        let direction = Direction::from_byte(bytes[8]).ok_or_else(|| CaptureError::Corrupt {
            offset,
            reason: format!("unknown direction byte {:#04x}", bytes[8]),
        })?;
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[9..13]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&bytes[13..17]);

        Ok(Self {
            connection: ConnectionId::new(u64::from_le_bytes(seq)),
            direction,
            length: u32::from_le_bytes(len),
            checksum: u32::from_le_bytes(crc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let record = CaptureRecord::response(ConnectionId::new(0x0102), b"hi".to_vec());
        let header = record.header().unwrap();

        assert_eq!(&header[0..8], &0x0102u64.to_le_bytes());
        assert_eq!(header[8], 1);
        assert_eq!(&header[9..13], &2u32.to_le_bytes());
        assert_eq!(&header[13..17], &crc32fast::hash(b"hi").to_le_bytes());
        assert_eq!(record.encoded_len(), RECORD_HEADER_SIZE + 2);
    }

    #[test]
    fn test_header_rejects_unknown_direction() {
        let mut header = CaptureRecord::request(ConnectionId::new(1), vec![])
            .header()
            .unwrap();
        header[8] = 9;
        assert!(matches!(
            RecordHeader::decode(&header, 8),
            Err(CaptureError::Corrupt { offset: 8, .. })
        ));
    }
}
