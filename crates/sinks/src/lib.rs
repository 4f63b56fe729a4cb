//! Tracepipe Sinks - EventSink implementations
//!
//! Small, local sinks for the pipeline's [`EventSink`] contract. The
//! network-bound sinks (search engines, document stores, remote collectors)
//! live behind the same contract but outside this workspace; what's here is
//! what the agent can run standalone:
//!
//! - `StdoutSink` - human-readable debug output, not for production rates
//! - `FileSink` - length-prefixed binary log file; pairs with the volatile
//!   queue, where the sink itself is the durable store
//! - `NullSink` - discards everything; benchmarking and wiring tests
//!
//! All sinks keep per-sink counters via [`SinkMetrics`].
//!
//! [`EventSink`]: tracepipe_pipeline::EventSink

mod common;
mod file;
mod null;
mod stdout;

pub use common::{SinkMetrics, SinkMetricsSnapshot};
pub use file::FileSink;
pub use null::NullSink;
pub use stdout::StdoutSink;

#[cfg(test)]
mod null_test;
