//! Null sink - accepts and discards every batch
//!
//! Useful for benchmarks and wiring tests; only the metrics survive.

use std::sync::Arc;

use async_trait::async_trait;
use tracepipe_pipeline::{EventSink, SinkError};
use tracepipe_protocol::Batch;

use crate::common::SinkMetrics;

/// Discards all batches, counting them
#[derive(Default)]
pub struct NullSink {
    metrics: Arc<SinkMetrics>,
}

impl NullSink {
    /// Create a null sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared metrics handle
    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl EventSink for NullSink {
    async fn write_batch(&mut self, batch: Batch) -> Result<(), SinkError> {
        self.metrics
            .batch_written(batch.len() as u64, batch.payload_bytes() as u64);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
