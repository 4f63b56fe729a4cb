//! Tracepipe Pipeline - the batched delivery core
//!
//! Connects bursty multi-threaded producers to one slow, fallible sink
//! through a queue, without ever blocking a producer on I/O.
//!
//! # Architecture
//!
//! ```text
//! [Producers]                [Queue]                  [Assembler]        [Sink]
//!   thread A ──┐                                   ┌─ batch close on
//!   thread B ──┼──→ DurableQueue / VolatileQueue ──┤  boundary sentinel ──→ write_batch
//!   timer ─────┘      (sentinels in-band)          └─ truncate after        (one in
//!                                                     success              flight)
//! ```
//!
//! # Key Design
//!
//! - **Sentinel-driven batching**: both triggers (count and time) write the
//!   same boundary sentinel into the queue, so the assembler never needs to
//!   know which one fired
//! - **Exactly one consumer**: the assembler is the sole reader of its queue
//!   and the sole caller of the sink, so the sink needs no internal locking
//! - **Truncate only after success**: the durable queue's truncation point
//!   advances only once a batch is accepted downstream; a crash replays
//!   everything since (at-least-once)
//! - **No internal retries**: a sink failure halts the pipeline and surfaces
//!   through the completion signal; retry policy belongs to a wrapper around
//!   the sink
//!
//! # Example
//!
//! ```ignore
//! use tracepipe_pipeline::{PipelineOptions, RunningPipeline};
//! use tracepipe_queue::DurableQueue;
//!
//! let queue = DurableQueue::open("/var/lib/tracepipe/queue")?;
//! let pipeline = RunningPipeline::start_durable(queue, sink, PipelineOptions::default())?;
//!
//! // Producer callbacks, any thread, never blocking:
//! let producer = pipeline.producer();
//! producer.write(event_bytes);
//!
//! // Supervisor:
//! pipeline.completion().wait().await?;
//! ```

mod assembler;
mod error;
mod metrics;
mod pipeline;
mod sink;
mod trigger;

pub use error::PipelineError;
pub use metrics::{PipelineMetrics, PipelineSnapshot};
pub use pipeline::{PipelineOptions, ProducerHandle, RunningPipeline};
pub use sink::{Completion, EventSink, SinkError};

// Re-export key types from dependencies for convenience
pub use tracepipe_protocol::{Batch, SequencedRecord};
pub use tracepipe_queue::{DurableQueue, FlushState};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Default number of records that closes a batch
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Default maximum delay before a partial batch is flushed
pub const DEFAULT_MAX_WRITE_DELAY: std::time::Duration = std::time::Duration::from_millis(400);

#[cfg(test)]
mod pipeline_test;
