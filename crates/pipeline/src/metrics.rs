//! Pipeline metrics
//!
//! Lock-free counters shared by the producer handles and the assembler.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline instance
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Records accepted by the queue
    records_enqueued: AtomicU64,

    /// Records dropped because the queue refused the append
    records_dropped: AtomicU64,

    /// Batches accepted by the sink
    batches_delivered: AtomicU64,

    /// Records accepted by the sink (sum of batch lengths)
    records_delivered: AtomicU64,

    /// Payload bytes accepted by the sink
    bytes_delivered: AtomicU64,

    /// Boundary sentinels observed with nothing to close
    empty_marks_skipped: AtomicU64,

    /// Deliveries the sink rejected (at most one; the pipeline then halts)
    delivery_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create a zeroed metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_enqueued(&self) {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivered(&self, records: u64, bytes: u64) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.records_delivered.fetch_add(records, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_empty_mark(&self) {
        self.empty_marks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            records_enqueued: self.records_enqueued.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            empty_marks_skipped: self.empty_marks_skipped.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSnapshot {
    pub records_enqueued: u64,
    pub records_dropped: u64,
    pub batches_delivered: u64,
    pub records_delivered: u64,
    pub bytes_delivered: u64,
    pub empty_marks_skipped: u64,
    pub delivery_failures: u64,
}
