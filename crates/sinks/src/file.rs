//! File sink - length-prefixed binary log files
//!
//! The on-disk format stores one entry per record:
//!
//! ```text
//! [u64 BE sequence][u32 BE payload len][payload bytes]
//! ```
//!
//! Each batch is written as one buffered burst and made durable with a data
//! sync before the write is acknowledged - that acknowledgement is what lets
//! this sink back a *volatile* queue: once the pipeline truncates nothing,
//! the file is the system of record. Rotation/rollover is the concern of an
//! external collaborator watching the file, not of this sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracepipe_pipeline::{EventSink, SinkError};
use tracepipe_protocol::Batch;

use crate::common::SinkMetrics;

/// Size of the per-entry header: sequence + payload length
pub const ENTRY_HEADER_LEN: usize = 12;

/// Appends batches to a binary log file
pub struct FileSink {
    /// None after close
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    metrics: Arc<SinkMetrics>,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::info!(path = %path.display(), "file sink opened");
        Ok(Self {
            writer: Some(BufWriter::with_capacity(64 * 1024, file)),
            path,
            metrics: Arc::new(SinkMetrics::new()),
        })
    }

    /// Path this sink appends to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared metrics handle
    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    fn try_write(&mut self, batch: &Batch) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;

        for record in batch.records() {
            writer.write_all(&record.sequence().to_be_bytes())?;
            writer.write_all(&(record.payload().len() as u32).to_be_bytes())?;
            writer.write_all(record.payload())?;
        }
        writer.flush()?;
        // Durable before acknowledging: a volatile queue has no replay.
        writer.get_ref().sync_data()?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn write_batch(&mut self, batch: Batch) -> Result<(), SinkError> {
        let records = batch.len() as u64;
        let bytes = batch.payload_bytes() as u64;

        if let Err(error) = self.try_write(&batch) {
            self.metrics.write_error();
            return Err(error);
        }

        self.metrics.batch_written(records, bytes);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
            tracing::info!(path = %self.path.display(), "file sink closed");
        }
        Ok(())
    }
}
