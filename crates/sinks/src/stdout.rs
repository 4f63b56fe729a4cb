//! Stdout sink - human-readable debug output
//!
//! One line per record. Not intended for production use at high throughput.
//!
//! # Example Output
//!
//! ```text
//! 07:34:59.161 seq=17 {"event":"page_view","url":"/home"}
//! 07:34:59.162 seq=18 {"event":"login_failed"}
//! ```

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracepipe_pipeline::{EventSink, SinkError};
use tracepipe_protocol::Batch;

use crate::common::SinkMetrics;

/// Prints each record's payload to stdout
#[derive(Default)]
pub struct StdoutSink {
    /// Show a summary header before each batch
    show_batch_headers: bool,
    metrics: Arc<SinkMetrics>,
}

impl StdoutSink {
    /// Create a sink with default formatting
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable per-batch summary headers
    pub fn with_headers() -> Self {
        Self {
            show_batch_headers: true,
            ..Self::default()
        }
    }

    /// Shared metrics handle
    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    async fn write_batch(&mut self, batch: Batch) -> Result<(), SinkError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        if self.show_batch_headers {
            writeln!(
                out,
                "--- batch: {} records, {} bytes, seq {}..={} ---",
                batch.len(),
                batch.payload_bytes(),
                batch.first_sequence(),
                batch.last_sequence()
            )?;
        }

        for record in batch.records() {
            writeln!(
                out,
                "{} seq={} {}",
                Utc::now().format("%H:%M:%S%.3f"),
                record.sequence(),
                String::from_utf8_lossy(record.payload())
            )?;
        }
        out.flush()?;

        self.metrics
            .batch_written(batch.len() as u64, batch.payload_bytes() as u64);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
