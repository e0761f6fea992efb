// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `sabench inspect` command - print the records of a capture file.

use std::path::Path;

use sabench_core::capture::CaptureReader;
use sabench_core::CaptureRecord;

use super::CliError;

/// Bytes of payload shown per record.
const PREVIEW_BYTES: usize = 60;

pub fn execute(file: &Path, limit: Option<usize>) -> Result<(), CliError> {
    tracing::info!(file = %file.display(), "Inspecting capture file");

    let reader = CaptureReader::open(file)?;

    println!("{:>8}  {:<8}  {:>9}  PAYLOAD", "CONN", "DIR", "BYTES");
    let mut shown = 0usize;
    let mut total_bytes = 0usize;
    for record in reader.take(limit.unwrap_or(usize::MAX)) {
        let record = record?;
        println!("{}", format_record(&record));
        shown += 1;
        total_bytes += record.payload.len();
    }

    println!();
    println!("✓ {} records, {} payload bytes", shown, total_bytes);
    Ok(())
}

fn format_record(record: &CaptureRecord) -> String {
    format!(
        "{:>8}  {:<8}  {:>9}  {}",
        record.connection.to_string(),
        record.direction.as_str(),
        record.payload.len(),
        preview(&record.payload)
    )
}

/// Printable ASCII preview; everything else shows as `.`.
fn preview(payload: &[u8]) -> String {
    let mut out: String = payload
        .iter()
        .take(PREVIEW_BYTES)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    if payload.len() > PREVIEW_BYTES {
        out.push_str("...");
    }
    out
}
