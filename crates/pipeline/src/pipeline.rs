//! Pipeline orchestration
//!
//! `RunningPipeline` owns one pipeline instance: the assembler task, the
//! time-trigger task, and (durable variant) the commit worker. Producers get
//! a cheap, cloneable [`ProducerHandle`] whose `write` never blocks on I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tracepipe_protocol::{SequencedRecord, BATCH_MARK};
use tracepipe_queue::{volatile_queue, DurableQueue, FlushState, VolatileQueue};

use crate::assembler::{Assembler, Source};
use crate::metrics::PipelineMetrics;
use crate::sink::{Completion, CompletionHandle, EventSink};
use crate::trigger::run_time_trigger;
use crate::{Result, DEFAULT_BATCH_SIZE, DEFAULT_MAX_WRITE_DELAY};

/// Tuning knobs for one pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Records per batch before the count trigger seals it
    pub batch_size: u64,

    /// Maximum time a partial batch may wait before the time trigger seals it
    pub max_write_delay: Duration,

    /// Deliver a non-empty partial batch on graceful shutdown
    pub flush_on_shutdown: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_write_delay: DEFAULT_MAX_WRITE_DELAY,
            flush_on_shutdown: true,
        }
    }
}

/// Write side shared by producers and the time trigger
///
/// The time trigger is just a second producer that only ever writes
/// sentinels; both go through the same appends and the same flush state.
#[derive(Clone)]
pub(crate) enum QueueWriter {
    Durable(DurableQueue),
    Volatile(VolatileQueue),
}

impl QueueWriter {
    /// Append one frame; returns false when the queue refuses it
    pub(crate) fn append_frame(&self, frame: Bytes) -> bool {
        match self {
            QueueWriter::Durable(queue) => match queue.try_append(&frame) {
                Ok(_) => true,
                Err(error) => {
                    tracing::debug!(%error, "queue refused append, dropping record");
                    false
                }
            },
            QueueWriter::Volatile(queue) => queue.write(frame),
        }
    }

    /// Write a batch-boundary sentinel
    pub(crate) fn write_sentinel(&self) {
        if !self.append_frame(Bytes::from_static(&BATCH_MARK)) {
            tracing::warn!("failed to write batch boundary sentinel");
        }
    }

    /// Ask for the appended frames to become durable soon (durable only)
    pub(crate) fn request_commit(&self) {
        if let QueueWriter::Durable(queue) = self {
            queue.request_commit();
        }
    }
}

/// Cloneable producer-side handle
///
/// Safe to call from arbitrary threads (e.g. tracing-library callbacks);
/// `write` is fire-and-forget and never performs I/O.
#[derive(Clone)]
pub struct ProducerHandle {
    inner: Arc<ProducerShared>,
}

struct ProducerShared {
    writer: QueueWriter,
    flush: Arc<FlushState>,
    batch_size: u64,
    sequence: AtomicU64,
    metrics: Arc<PipelineMetrics>,
}

impl ProducerHandle {
    /// Enqueue one event payload
    ///
    /// Assigns the next sequence number, appends the encoded record, and -
    /// when this write lands exactly on the batch size - writes the boundary
    /// sentinel. Returns `false` (record dropped) when the queue refuses the
    /// append; the pipeline never retries on the producer's behalf.
    pub fn write(&self, payload: impl Into<Bytes>) -> bool {
        let inner = &self.inner;
        let sequence = inner.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = SequencedRecord::new(sequence, payload).encode();

        if !inner.writer.append_frame(frame) {
            inner.metrics.record_dropped();
            return false;
        }
        inner.metrics.record_enqueued();

        if inner.flush.try_advance(inner.batch_size) {
            inner.writer.write_sentinel();
            inner.writer.request_commit();
        }
        true
    }
}

/// A started pipeline instance
///
/// Dropping without [`shutdown`](Self::shutdown) aborts nothing: the tasks
/// keep running on the runtime until cancelled or failed.
pub struct RunningPipeline {
    producer: ProducerHandle,
    completion: Completion,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
    assembler: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    /// Kept so graceful shutdown can push the stream-end sentinel
    volatile: Option<VolatileQueue>,
}

impl RunningPipeline {
    /// Start a pipeline over a durable queue
    ///
    /// The scan resumes at the queue's truncation point, so batches sealed
    /// but not truncated by a previous run are replayed before anything new.
    /// Must be called within a tokio runtime.
    pub fn start_durable(
        queue: DurableQueue,
        sink: Box<dyn EventSink>,
        options: PipelineOptions,
    ) -> Result<Self> {
        assert!(options.batch_size > 0, "batch_size must be positive");

        let cancel = CancellationToken::new();
        let flush = Arc::new(FlushState::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let (handle, completion) = CompletionHandle::new();

        let stream = queue.scan(queue.begin(), cancel.child_token())?;
        tracing::info!(
            resume_at = queue.begin(),
            committed = queue.committed(),
            "starting durable pipeline"
        );

        let writer = QueueWriter::Durable(queue.clone());
        let assembler = Assembler::new(
            Source::Durable {
                queue: queue.clone(),
                stream,
            },
            sink,
            options.flush_on_shutdown,
            Arc::clone(&metrics),
            handle,
        );

        let mut workers = Vec::new();
        workers.push(tokio::spawn(run_time_trigger(
            writer.clone(),
            Arc::clone(&flush),
            options.max_write_delay,
            cancel.child_token(),
        )));
        workers.push(tokio::spawn({
            let queue = queue.clone();
            let cancel = cancel.child_token();
            async move { queue.run_commit_worker(cancel).await }
        }));

        Ok(Self {
            producer: ProducerHandle {
                inner: Arc::new(ProducerShared {
                    writer,
                    flush,
                    batch_size: options.batch_size,
                    sequence: AtomicU64::new(0),
                    metrics: Arc::clone(&metrics),
                }),
            },
            completion,
            metrics,
            cancel,
            assembler: tokio::spawn(assembler.run()),
            workers,
            volatile: None,
        })
    }

    /// Start a pipeline over a fresh volatile queue
    ///
    /// Used when the sink itself provides durability. Must be called within
    /// a tokio runtime.
    pub fn start_volatile(sink: Box<dyn EventSink>, options: PipelineOptions) -> Self {
        assert!(options.batch_size > 0, "batch_size must be positive");

        let cancel = CancellationToken::new();
        let flush = Arc::new(FlushState::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let (handle, completion) = CompletionHandle::new();

        let (queue, reader) = volatile_queue();
        tracing::info!("starting volatile pipeline");

        let writer = QueueWriter::Volatile(queue.clone());
        let assembler = Assembler::new(
            Source::Volatile {
                reader,
                cancel: cancel.child_token(),
            },
            sink,
            options.flush_on_shutdown,
            Arc::clone(&metrics),
            handle,
        );

        let workers = vec![tokio::spawn(run_time_trigger(
            writer.clone(),
            Arc::clone(&flush),
            options.max_write_delay,
            cancel.child_token(),
        ))];

        Self {
            producer: ProducerHandle {
                inner: Arc::new(ProducerShared {
                    writer,
                    flush,
                    batch_size: options.batch_size,
                    sequence: AtomicU64::new(0),
                    metrics: Arc::clone(&metrics),
                }),
            },
            completion,
            metrics,
            cancel,
            assembler: tokio::spawn(assembler.run()),
            workers,
            volatile: Some(queue),
        }
    }

    /// Get a producer handle
    pub fn producer(&self) -> ProducerHandle {
        self.producer.clone()
    }

    /// Get the completion signal
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Stop the pipeline and wait for it to finish
    ///
    /// Volatile variant: pushes the stream-end sentinel so the assembler
    /// drains everything already queued. Durable variant: cancels the scan;
    /// anything not yet delivered stays in the log for the next run. Either
    /// way the partial batch in flight is delivered only when
    /// `flush_on_shutdown` is set.
    pub async fn shutdown(self) -> std::result::Result<(), Arc<crate::PipelineError>> {
        match &self.volatile {
            Some(queue) => {
                queue.complete();
            }
            None => self.cancel.cancel(),
        }

        let _ = self.assembler.await;
        self.cancel.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }

        let mut completion = self.completion;
        completion.wait().await
    }
}
