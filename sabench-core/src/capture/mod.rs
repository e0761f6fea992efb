// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Capture of raw request/response bytes for offline analysis.

mod reader;
mod record;
mod sink;

pub use reader::{CaptureReader, MAX_RECORD_PAYLOAD};
pub use record::{CaptureRecord, Direction, CAPTURE_MAGIC, RECORD_HEADER_SIZE};
pub use sink::{CaptureSink, FileSink, FileSinkWriter, MemorySink, NullSink};
