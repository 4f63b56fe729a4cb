//! Pipeline error types

use thiserror::Error;

use tracepipe_protocol::ProtocolError;
use tracepipe_queue::QueueError;

use crate::sink::SinkError;

/// Errors that halt a pipeline instance
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Sink delivery failed; the undelivered batch stays replayable
    #[error("sink delivery failed: {0}")]
    Sink(#[from] SinkError),

    /// Queue operation failed (durability, scan, truncation)
    #[error("queue failure: {0}")]
    Queue(#[from] QueueError),

    /// A scanned frame could not be decoded
    #[error("record decode failed: {0}")]
    Protocol(#[from] ProtocolError),

    /// The assembler task stopped without resolving the completion signal
    #[error("assembler stopped unexpectedly")]
    AssemblerStopped,
}
