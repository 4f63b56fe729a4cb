//! EventSink contract and the pipeline completion signal
//!
//! The sink is the pipeline's downstream: a search engine bulk writer, a
//! document store, a rolling file, a remote collector. The pipeline owns the
//! sink for its whole run and promises to never overlap `write_batch` calls,
//! so implementations need no internal locking.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracepipe_protocol::Batch;

use crate::error::PipelineError;

/// Downstream delivery target consumed by the pipeline
///
/// # Contract
///
/// - `write_batch` is never invoked while a previous invocation is pending
///   (enforced here by `&mut self`); failures must be reported through the
///   returned result, not by panicking
/// - `close` is idempotent; the pipeline calls it exactly once per run, on
///   clean shutdown, cancellation, and after a delivery failure alike
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one whole batch; awaited before the next delivery starts
    async fn write_batch(&mut self, batch: Batch) -> Result<(), SinkError>;

    /// Release the sink's resources; calling twice must not fail
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// Errors reported by sink implementations
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink initialization failed
    #[error("failed to initialize sink: {0}")]
    Init(String),

    /// Failed to write a batch
    #[error("write failed: {0}")]
    Write(String),

    /// Sink was asked to write after closing
    #[error("sink is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Create an initialization error
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }
}

/// Lifecycle state carried by the completion signal
#[derive(Debug, Clone, Default)]
enum CompletionState {
    #[default]
    Pending,
    Closed,
    Failed(Arc<PipelineError>),
}

/// Observer half of the pipeline's completion signal
///
/// Resolves exactly once: to a clean close, or to the error that halted the
/// pipeline. Clone freely; every clone observes the same resolution.
#[derive(Clone)]
pub struct Completion {
    rx: watch::Receiver<CompletionState>,
}

impl Completion {
    /// Wait for the pipeline to finish
    pub async fn wait(&mut self) -> Result<(), Arc<PipelineError>> {
        loop {
            {
                let state = self.rx.borrow_and_update();
                match &*state {
                    CompletionState::Pending => {}
                    CompletionState::Closed => return Ok(()),
                    CompletionState::Failed(error) => return Err(Arc::clone(error)),
                }
            }
            if self.rx.changed().await.is_err() {
                return Err(Arc::new(PipelineError::AssemblerStopped));
            }
        }
    }

    /// Non-blocking check; `None` while the pipeline is still running
    pub fn try_result(&self) -> Option<Result<(), Arc<PipelineError>>> {
        match &*self.rx.borrow() {
            CompletionState::Pending => None,
            CompletionState::Closed => Some(Ok(())),
            CompletionState::Failed(error) => Some(Err(Arc::clone(error))),
        }
    }
}

/// Resolver half, owned by the assembler
pub(crate) struct CompletionHandle {
    tx: watch::Sender<CompletionState>,
}

impl CompletionHandle {
    pub(crate) fn new() -> (CompletionHandle, Completion) {
        let (tx, rx) = watch::channel(CompletionState::Pending);
        (CompletionHandle { tx }, Completion { rx })
    }

    /// Resolve to a clean close; a no-op if already resolved
    pub(crate) fn resolve_ok(&self) {
        self.tx.send_if_modified(|state| {
            if matches!(state, CompletionState::Pending) {
                *state = CompletionState::Closed;
                true
            } else {
                false
            }
        });
    }

    /// Resolve to a failure; a no-op if already resolved
    pub(crate) fn resolve_err(&self, error: PipelineError) {
        self.tx.send_if_modified(|state| {
            if matches!(state, CompletionState::Pending) {
                *state = CompletionState::Failed(Arc::new(error));
                true
            } else {
                false
            }
        });
    }
}
