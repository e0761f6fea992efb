// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Capture sinks.
//!
//! A sink receives [`CaptureRecord`]s from many connection tasks at once.
//! [`FileSink`] funnels them through an unbounded queue into a single writer
//! task, so producers never wait on disk and records sent by one task keep
//! their order in the file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::capture::record::{CaptureRecord, CAPTURE_MAGIC};
use crate::error::CaptureError;
use crate::metrics::ListenerMetrics;

/// Buffer size of the file writer.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Ordered, append-only destination for captured traffic.
pub trait CaptureSink: Send + Sync + 'static {
    /// Append a record. Fails when the underlying medium cannot accept bytes.
    fn write(&self, record: CaptureRecord) -> Result<(), CaptureError>;

    /// Whether records are kept at all. Handlers skip building records when
    /// this is false.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Sink used when capture is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CaptureSink for NullSink {
    fn write(&self, _record: CaptureRecord) -> Result<(), CaptureError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<CaptureRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl CaptureSink for MemorySink {
    fn write(&self, record: CaptureRecord) -> Result<(), CaptureError> {
        let mut records = self.records.lock().map_err(|_| CaptureError::Closed)?;
        records.push(record);
        Ok(())
    }
}

enum SinkCommand {
    Record(CaptureRecord),
    Flush(oneshot::Sender<Result<(), CaptureError>>),
}

/// Buffered file sink backed by a single writer task.
///
/// Cloning is cheap; all clones feed the same writer.
#[derive(Debug, Clone)]
pub struct FileSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
    failed: Arc<AtomicBool>,
    path: Arc<PathBuf>,
}

impl std::fmt::Debug for SinkCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(record) => f
                .debug_struct("Record")
                .field("connection", &record.connection)
                .field("direction", &record.direction)
                .field("len", &record.payload.len())
                .finish(),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl FileSink {
    /// Create (truncate) the capture file and start the writer task.
    ///
    /// Records the writer fails to persist are counted in `metrics`.
    /// Must be called from within a tokio runtime.
    pub async fn create(
        path: impl AsRef<Path>,
        metrics: ListenerMetrics,
    ) -> Result<(Self, FileSinkWriter), CaptureError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::create(&path).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        writer.write_all(CAPTURE_MAGIC).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let failed = Arc::new(AtomicBool::new(false));
        let state = WriterState {
            writer,
            metrics,
            failed: failed.clone(),
            first_error: None,
            unflushed: 0,
        };
        let task = tokio::spawn(run_writer(state, rx));

        tracing::info!(path = %path.display(), "Capture enabled");

        Ok((
            Self {
                tx,
                failed,
                path: Arc::new(path),
            },
            FileSinkWriter { task },
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make every record written so far durable.
    ///
    /// Reports the first write failure the writer hit, if any. Once this
    /// returns, every record sent before the call has been written or
    /// counted as dropped.
    pub async fn flush(&self) -> Result<(), CaptureError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Flush(ack_tx))
            .map_err(|_| CaptureError::Closed)?;
        ack_rx.await.map_err(|_| CaptureError::Closed)?
    }
}

impl CaptureSink for FileSink {
    fn write(&self, record: CaptureRecord) -> Result<(), CaptureError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(CaptureError::Closed);
        }
        self.tx
            .send(SinkCommand::Record(record))
            .map_err(|_| CaptureError::Closed)
    }
}

/// Handle to the writer task; resolves once every sink clone is dropped.
#[derive(Debug)]
pub struct FileSinkWriter {
    task: JoinHandle<()>,
}

impl FileSinkWriter {
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Capture writer task panicked");
        }
    }
}

/// Writer-side bookkeeping.
///
/// Records accepted since the last successful flush may still sit in the
/// buffer, so a failure counts all of them as lost.
struct WriterState {
    writer: BufWriter<tokio::fs::File>,
    metrics: ListenerMetrics,
    failed: Arc<AtomicBool>,
    first_error: Option<std::io::Error>,
    unflushed: u64,
}

impl WriterState {
    async fn write(&mut self, record: &CaptureRecord, scratch: &mut Vec<u8>) {
        if self.first_error.is_some() {
            self.metrics.capture_write_failed();
            return;
        }
        scratch.clear();
        if let Err(e) = record.encode_into(scratch) {
            self.metrics.capture_write_failed();
            tracing::warn!(error = %e, connection = %record.connection, "Capture record not encodable");
            return;
        }
        match self.writer.write_all(&scratch[..]).await {
            Ok(()) => self.unflushed += 1,
            Err(e) => {
                tracing::error!(error = %e, connection = %record.connection, "Capture write failed");
                self.fail(e, 1);
            }
        }
    }

    async fn flush(&mut self) -> Result<(), CaptureError> {
        if let Some(e) = &self.first_error {
            return Err(CaptureError::Io(copy_error(e)));
        }
        match flush_durable(&mut self.writer).await {
            Ok(()) => {
                self.unflushed = 0;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Capture flush failed");
                let reported = copy_error(&e);
                self.fail(e, 0);
                Err(CaptureError::Io(reported))
            }
        }
    }

    /// Latch the failure and count `extra` lost records on top of the
    /// buffered ones.
    fn fail(&mut self, error: std::io::Error, extra: u64) {
        self.metrics.capture_writes_dropped(self.unflushed + extra);
        self.unflushed = 0;
        self.failed.store(true, Ordering::Release);
        self.first_error = Some(error);
    }
}

fn copy_error(e: &std::io::Error) -> std::io::Error {
    std::io::Error::new(e.kind(), e.to_string())
}

async fn run_writer(mut state: WriterState, mut rx: mpsc::UnboundedReceiver<SinkCommand>) {
    let mut scratch = Vec::with_capacity(WRITE_BUFFER_SIZE);

    while let Some(command) = rx.recv().await {
        match command {
            SinkCommand::Record(record) => state.write(&record, &mut scratch).await,
            SinkCommand::Flush(ack) => {
                let _ = ack.send(state.flush().await);
            }
        }
    }

    if state.first_error.is_none() {
        // Logged and counted inside.
        let _ = state.flush().await;
    }
}

async fn flush_durable(writer: &mut BufWriter<tokio::fs::File>) -> std::io::Result<()> {
    writer.flush().await?;
    writer.get_ref().sync_data().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::reader::CaptureReader;
    use crate::types::ConnectionId;
    use tempfile::TempDir;

    #[test]
    fn test_null_sink_is_disabled() {
        let sink = NullSink;
        assert!(!sink.is_enabled());
        assert!(sink
            .write(CaptureRecord::request(ConnectionId::new(1), b"x".to_vec()))
            .is_ok());
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.write(CaptureRecord::request(ConnectionId::new(1), b"a".to_vec()))
            .unwrap();
        sink.write(CaptureRecord::response(ConnectionId::new(1), b"b".to_vec()))
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"a");
        assert_eq!(records[1].payload, b"b");
    }

    #[tokio::test]
    async fn test_file_sink_flush_makes_records_readable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("capture.bin");

        let (sink, writer) = FileSink::create(&path, ListenerMetrics::unregistered().unwrap())
            .await
            .unwrap();
        sink.write(CaptureRecord::request(ConnectionId::new(3), b"{\"a\":1}\n".to_vec()))
            .unwrap();
        sink.write(CaptureRecord::response(ConnectionId::new(3), b"ok\n".to_vec()))
            .unwrap();
        sink.flush().await.unwrap();

        let records = CaptureReader::open(&path)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"{\"a\":1}\n");
        assert_eq!(records[1].payload, b"ok\n");

        drop(sink);
        writer.join().await;
    }

    #[tokio::test]
    async fn test_file_sink_concurrent_producers_keep_per_connection_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("capture.bin");
        let (sink, writer) = FileSink::create(&path, ListenerMetrics::unregistered().unwrap())
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for conn in 0..8u64 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50u32 {
                    sink.write(CaptureRecord::request(
                        ConnectionId::new(conn),
                        i.to_le_bytes().to_vec(),
                    ))
                    .unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        sink.flush().await.unwrap();

        let records = CaptureReader::open(&path)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 8 * 50);
        for conn in 0..8u64 {
            let seen: Vec<u32> = records
                .iter()
                .filter(|r| r.connection.value() == conn)
                .map(|r| u32::from_le_bytes(r.payload[..4].try_into().unwrap()))
                .collect();
            assert_eq!(seen, (0..50).collect::<Vec<_>>());
        }

        drop(sink);
        writer.join().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_full_device_counts_every_lost_record() {
        let metrics = ListenerMetrics::unregistered().unwrap();
        let (sink, writer) = FileSink::create("/dev/full", metrics.clone())
            .await
            .unwrap();

        // Small records sit in the buffer until the flush fails.
        sink.write(CaptureRecord::request(ConnectionId::new(1), b"a\n".to_vec()))
            .unwrap();
        sink.write(CaptureRecord::response(ConnectionId::new(1), b"a\n".to_vec()))
            .unwrap();
        assert!(matches!(sink.flush().await, Err(CaptureError::Io(_))));
        assert_eq!(metrics.capture_failures_total(), 2);

        assert!(matches!(
            sink.write(CaptureRecord::request(ConnectionId::new(2), b"b\n".to_vec())),
            Err(CaptureError::Closed)
        ));

        drop(sink);
        writer.join().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_records_queued_behind_a_failed_write_are_counted() {
        let metrics = ListenerMetrics::unregistered().unwrap();
        let (sink, writer) = FileSink::create("/dev/full", metrics.clone())
            .await
            .unwrap();

        // Larger than the buffer, so the write itself hits the device.
        let big = vec![b'x'; 2 * WRITE_BUFFER_SIZE];
        sink.write(CaptureRecord::request(ConnectionId::new(1), big.clone()))
            .unwrap();
        sink.write(CaptureRecord::response(ConnectionId::new(1), big))
            .unwrap();
        assert!(sink.flush().await.is_err());
        assert_eq!(metrics.capture_failures_total(), 2);

        drop(sink);
        writer.join().await;
    }
}
