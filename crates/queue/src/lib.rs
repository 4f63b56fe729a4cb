//! Tracepipe Queue - multi-producer/single-consumer queues for the pipeline
//!
//! Two backings with one job: decouple bursty producer threads from a slow,
//! fallible consumer.
//!
//! - [`DurableQueue`] - an append-only on-disk log with a movable truncation
//!   point and a crash-consistent commit watermark. Survives process crashes;
//!   a restarted scan resumes at the truncation point, replaying anything
//!   that was delivered but never truncated (at-least-once).
//! - [`VolatileQueue`] - an unbounded in-process queue with completion
//!   semantics. No recovery; used when the sink itself is the durable store.
//!
//! [`FlushState`] carries the shared atomic batch counter and last-flush
//! tick that the count and time triggers coordinate through.
//!
//! # Concurrency
//!
//! Appends never block on I/O: producers write into an in-memory pending
//! region under a short `parking_lot` lock, and a commit moves pending bytes
//! to disk off the producer threads. Exactly one reader per queue is
//! supported.

mod error;
mod flush_state;
mod volatile;
mod wal;

pub use error::QueueError;
pub use flush_state::FlushState;
pub use volatile::{volatile_queue, VolatileQueue, VolatileReader};
pub use wal::{DurableQueue, RecordStream, ScannedFrame};

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod wal_test;
