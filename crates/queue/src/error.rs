//! Queue error types

use thiserror::Error;

/// Errors raised by the durable and volatile queues
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue has been closed; no further appends are accepted
    #[error("queue is closed")]
    Closed,

    /// Frame exceeds the maximum length the log format can represent
    #[error("frame too large: {len} bytes")]
    FrameTooLarge { len: usize },

    /// On-disk state is inconsistent with the watermarks
    #[error("log corrupt at position {position}")]
    Corrupt { position: u64 },

    /// Truncation requested past the durable boundary
    #[error("cannot truncate to {upto}: commit watermark is {committed}")]
    TruncateBeyondCommit { upto: u64, committed: u64 },

    /// Scan requested below the truncation point
    #[error("cannot scan from {from}: truncation point is {begin}")]
    ScanBelowTruncation { from: u64, begin: u64 },

    /// Background commit task failed to run
    #[error("background commit failed: {0}")]
    Background(String),

    /// I/O error from the backing store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
