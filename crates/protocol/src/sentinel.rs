//! Sentinel frames - in-band control signals
//!
//! Two reserved 4-byte frames share the queue with ordinary records:
//!
//! - [`BATCH_MARK`] closes the batch that precedes it, even if not full
//! - [`STREAM_END`] (volatile queue only) announces that no more records
//!   will ever be written
//!
//! Encoded records always carry an 8-byte sequence header, so a 4-byte frame
//! can never be produced by normal serialization. Classification is an exact
//! length + content match.

use crate::record::RECORD_HEADER_LEN;

/// Length of every sentinel frame
pub const SENTINEL_LEN: usize = 4;

/// Batch-boundary sentinel: "close the batch that precedes me"
pub const BATCH_MARK: [u8; SENTINEL_LEN] = [0x00, 0x00, 0x00, 0x00];

/// Stream-end sentinel: "no more records will ever be written"
pub const STREAM_END: [u8; SENTINEL_LEN] = [0xFF, 0xFF, 0xFF, 0xFF];

// Sentinels must stay shorter than the record header or the reserved-length
// guarantee breaks.
const _: () = assert!(SENTINEL_LEN < RECORD_HEADER_LEN);

/// Classification of one queue frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// An ordinary encoded record
    Record,
    /// Batch-boundary sentinel
    BatchMark,
    /// Stream-end sentinel
    StreamEnd,
}

/// Classify a raw frame by exact length and content
#[inline]
pub fn classify(frame: &[u8]) -> FrameKind {
    if frame.len() == SENTINEL_LEN {
        if frame == BATCH_MARK {
            return FrameKind::BatchMark;
        }
        if frame == STREAM_END {
            return FrameKind::StreamEnd;
        }
    }
    FrameKind::Record
}
