// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sequential reader for capture files.
//!
//! Every record is checksum-validated as it is read. Reading stops at the
//! first corrupt record.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::capture::record::{CaptureRecord, RecordHeader, CAPTURE_MAGIC, RECORD_HEADER_SIZE};
use crate::error::CaptureError;

/// Upper bound on a single record payload accepted by the reader.
pub const MAX_RECORD_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Iterator over the records of a capture stream.
pub struct CaptureReader<R> {
    inner: R,
    offset: u64,
    done: bool,
}

impl CaptureReader<BufReader<File>> {
    /// Open a capture file and validate its magic.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(mut inner: R) -> Result<Self, CaptureError> {
        let mut magic = [0u8; 8];
        inner.read_exact(&mut magic).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => CaptureError::Corrupt {
                offset: 0,
                reason: "file shorter than capture magic".to_string(),
            },
            _ => CaptureError::Io(e),
        })?;
        if &magic != CAPTURE_MAGIC {
            return Err(CaptureError::Corrupt {
                offset: 0,
                reason: "missing capture magic".to_string(),
            });
        }

        Ok(Self {
            inner,
            offset: CAPTURE_MAGIC.len() as u64,
            done: false,
        })
    }

    fn read_record(&mut self) -> Result<Option<CaptureRecord>, CaptureError> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        let filled = read_full(&mut self.inner, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < RECORD_HEADER_SIZE {
            return Err(CaptureError::Corrupt {
                offset: self.offset,
                reason: format!("truncated record header ({} of {} bytes)", filled, RECORD_HEADER_SIZE),
            });
        }

        let header = RecordHeader::decode(&header, self.offset)?;
        if header.length > MAX_RECORD_PAYLOAD {
            return Err(CaptureError::Corrupt {
                offset: self.offset,
                reason: format!("record length {} exceeds {}", header.length, MAX_RECORD_PAYLOAD),
            });
        }

        let mut payload = vec![0u8; header.length as usize];
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < payload.len() {
            return Err(CaptureError::Corrupt {
                offset: self.offset,
                reason: format!("truncated payload ({} of {} bytes)", got, payload.len()),
            });
        }

        let actual = crc32fast::hash(&payload);
        if actual != header.checksum {
            return Err(CaptureError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        self.offset += (RECORD_HEADER_SIZE + payload.len()) as u64;
        Ok(Some(CaptureRecord {
            connection: header.connection,
            direction: header.direction,
            payload,
        }))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<CaptureRecord, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` as far as the stream allows; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CaptureError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CaptureError::Io(e)),
        }
    }
    Ok(filled)
}
