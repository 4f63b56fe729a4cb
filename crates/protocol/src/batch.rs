//! Batch - ordered record collection between two sentinels
//!
//! A `Batch` is the unit of delivery to a sink: every record read from the
//! queue since the previous boundary sentinel, in queue order. Batches are
//! transient - the assembler builds one per iteration and hands it off whole.
//!
//! # Design
//!
//! - `BatchBuilder::finish` returns `None` for an empty builder, which is how
//!   the no-empty-deliveries invariant is enforced at the type level
//! - `end_position` is the queue position one past the last included frame;
//!   for the durable queue it is the truncation target after delivery

use crate::record::SequencedRecord;

/// Ordered, finite sequence of records collected between two sentinels
#[derive(Debug, Clone)]
pub struct Batch {
    /// Records in queue order
    records: Vec<SequencedRecord>,

    /// Queue position of the first included frame
    first_position: u64,

    /// Queue position one past the last included frame (truncation target)
    end_position: u64,

    /// Sum of payload lengths
    payload_bytes: usize,
}

impl Batch {
    /// Get the records in queue order
    #[inline]
    pub fn records(&self) -> &[SequencedRecord] {
        &self.records
    }

    /// Consume the batch, returning its records
    #[inline]
    pub fn into_records(self) -> Vec<SequencedRecord> {
        self.records
    }

    /// Number of records in the batch (always >= 1)
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// A delivered batch is never empty; kept for API completeness
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total payload bytes across all records
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Queue position of the first included frame
    #[inline]
    pub fn first_position(&self) -> u64 {
        self.first_position
    }

    /// Queue position one past the last included frame
    #[inline]
    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    /// Sequence number of the first record
    #[inline]
    pub fn first_sequence(&self) -> u64 {
        self.records.first().map(SequencedRecord::sequence).unwrap_or(0)
    }

    /// Sequence number of the last record
    #[inline]
    pub fn last_sequence(&self) -> u64 {
        self.records.last().map(SequencedRecord::sequence).unwrap_or(0)
    }
}

/// Incremental builder used by the batch assembler
#[derive(Debug, Default)]
pub struct BatchBuilder {
    records: Vec<SequencedRecord>,
    first_position: Option<u64>,
    end_position: u64,
    payload_bytes: usize,
}

impl BatchBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record read from queue position `position`, whose frame ends
    /// at `end_position`
    pub fn push(&mut self, record: SequencedRecord, position: u64, end_position: u64) {
        self.first_position.get_or_insert(position);
        self.end_position = end_position;
        self.payload_bytes += record.payload().len();
        self.records.push(record);
    }

    /// Number of records accumulated so far
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing has been pushed yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Close the batch
    ///
    /// Returns `None` when nothing was accumulated - an empty batch is never
    /// materialized, let alone delivered.
    pub fn finish(self) -> Option<Batch> {
        if self.records.is_empty() {
            return None;
        }
        Some(Batch {
            first_position: self.first_position.unwrap_or(self.end_position),
            end_position: self.end_position,
            payload_bytes: self.payload_bytes,
            records: self.records,
        })
    }
}
