//! Batch assembler - the single consumer that turns a flat record stream
//! into discrete batches
//!
//! Exactly one assembler runs per pipeline instance. It is the sole reader
//! of its queue and the sole caller of the sink, which is what lets the
//! whole delivery path stay lock-free: ordering falls out of there being
//! only one of everything downstream of the queue.
//!
//! # State machine
//!
//! Scanning -> (records accumulate) -> boundary sentinel -> BatchClosing
//! (deliver, truncate) -> Scanning, or Stopped on cancellation, stream end,
//! or sink failure. An empty batch is never delivered: a sentinel with
//! nothing accumulated is skipped (and, for the durable queue, truncated
//! away so idle timer fires cannot grow the log).

use std::mem;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tracepipe_protocol::{classify, Batch, BatchBuilder, FrameKind, SequencedRecord};
use tracepipe_queue::{DurableQueue, QueueError, RecordStream, ScannedFrame, VolatileReader};

use crate::metrics::PipelineMetrics;
use crate::sink::{CompletionHandle, EventSink};
use crate::PipelineError;

/// Queue read side the assembler consumes
pub(crate) enum Source {
    Durable {
        queue: DurableQueue,
        stream: RecordStream,
    },
    Volatile {
        reader: VolatileReader,
        cancel: CancellationToken,
    },
}

/// One step of the scan loop
enum Step {
    Frame(ScannedFrame),
    Ended,
    Failed(QueueError),
}

pub(crate) struct Assembler {
    source: Source,
    sink: Box<dyn EventSink>,
    flush_on_shutdown: bool,
    metrics: Arc<PipelineMetrics>,
    completion: CompletionHandle,
    /// Synthetic positions for the volatile source (diagnostics only)
    volatile_position: u64,
}

impl Assembler {
    pub(crate) fn new(
        source: Source,
        sink: Box<dyn EventSink>,
        flush_on_shutdown: bool,
        metrics: Arc<PipelineMetrics>,
        completion: CompletionHandle,
    ) -> Self {
        Self {
            source,
            sink,
            flush_on_shutdown,
            metrics,
            completion,
            volatile_position: 0,
        }
    }

    /// Consume the queue until stopped; resolves the completion signal on
    /// every exit path
    pub(crate) async fn run(mut self) {
        let mut builder = BatchBuilder::new();

        let outcome: Result<(), PipelineError> = loop {
            match self.next_step().await {
                Step::Ended => {
                    break self.finish_partial(builder).await;
                }
                Step::Failed(error) => break Err(error.into()),
                Step::Frame(frame) => match classify(&frame.frame) {
                    FrameKind::BatchMark => {
                        match mem::take(&mut builder).finish() {
                            Some(batch) => {
                                if let Err(error) = self.deliver(batch).await {
                                    break Err(error);
                                }
                            }
                            None => {
                                // Nothing to close. Reclaim the sentinel
                                // frame itself: with an empty batch, nothing
                                // undelivered can precede it.
                                self.metrics.record_empty_mark();
                                if let Err(error) = self.truncate(frame.end_position).await {
                                    break Err(error.into());
                                }
                            }
                        }
                    }
                    FrameKind::StreamEnd => {
                        break self.finish_partial(builder).await;
                    }
                    FrameKind::Record => match SequencedRecord::decode(&frame.frame) {
                        Ok(record) => builder.push(record, frame.position, frame.end_position),
                        Err(error) => break Err(error.into()),
                    },
                },
            }
        };

        if let Err(error) = self.sink.close().await {
            tracing::warn!(%error, "sink close failed");
        }

        match outcome {
            Ok(()) => {
                tracing::info!("assembler stopped cleanly");
                self.completion.resolve_ok();
            }
            Err(error) => {
                tracing::error!(%error, "assembler halted");
                self.completion.resolve_err(error);
            }
        }
    }

    /// Yield the next frame from whichever backing this pipeline uses
    async fn next_step(&mut self) -> Step {
        match &mut self.source {
            Source::Durable { stream, .. } => match stream.next().await {
                Some(Ok(frame)) => Step::Frame(frame),
                Some(Err(error)) => Step::Failed(error),
                // Cancellation or a closed-and-drained queue.
                None => Step::Ended,
            },
            Source::Volatile { reader, cancel } => {
                tokio::select! {
                    _ = cancel.cancelled() => Step::Ended,
                    frame = reader.next() => match frame {
                        Some(frame) => {
                            let position = self.volatile_position;
                            self.volatile_position += 1;
                            Step::Frame(ScannedFrame {
                                frame,
                                position,
                                end_position: position + 1,
                            })
                        }
                        None => Step::Ended,
                    },
                }
            }
        }
    }

    /// Deliver one batch and, on success, advance the durable watermarks
    ///
    /// Exactly one delivery is in flight at any time: this method is only
    /// called from the scan loop, and it awaits the sink before returning.
    async fn deliver(&mut self, batch: Batch) -> Result<(), PipelineError> {
        let records = batch.len() as u64;
        let bytes = batch.payload_bytes() as u64;
        let end_position = batch.end_position();

        tracing::debug!(
            records,
            bytes,
            first_sequence = batch.first_sequence(),
            last_sequence = batch.last_sequence(),
            "delivering batch"
        );

        if let Err(error) = self.sink.write_batch(batch).await {
            self.metrics.record_delivery_failure();
            // The batch was not consumed: truncation stays put so a fresh
            // run over the same log replays it.
            return Err(error.into());
        }

        if let Source::Durable { queue, .. } = &self.source {
            queue.commit().await?;
            queue.truncate(end_position).await?;
        }

        self.metrics.record_delivered(records, bytes);
        Ok(())
    }

    /// Graceful-stop path: flush the open batch only when configured to
    async fn finish_partial(&mut self, builder: BatchBuilder) -> Result<(), PipelineError> {
        if !self.flush_on_shutdown {
            if !builder.is_empty() {
                tracing::debug!(
                    records = builder.len(),
                    "abandoning partial batch on shutdown"
                );
            }
            return Ok(());
        }
        match builder.finish() {
            Some(batch) => {
                tracing::debug!(records = batch.len(), "flushing partial batch on shutdown");
                self.deliver(batch).await
            }
            None => Ok(()),
        }
    }

    async fn truncate(&mut self, upto: u64) -> Result<(), QueueError> {
        if let Source::Durable { queue, .. } = &self.source {
            queue.truncate(upto).await?;
        }
        Ok(())
    }
}
