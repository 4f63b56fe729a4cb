//! VolatileQueue - unbounded in-memory queue with completion semantics
//!
//! The volatile backing is used when the sink itself is the durable store
//! (e.g. a rolling file): nothing here survives a crash, and there is no
//! truncation - frames leave memory as they are read.
//!
//! Completion is in-band: [`VolatileQueue::complete`] pushes the stream-end
//! sentinel, after which writes are refused and the consumer drains whatever
//! precedes the sentinel and stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracepipe_protocol::STREAM_END;

/// Create a connected writer/reader pair
pub fn volatile_queue() -> (VolatileQueue, VolatileReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        VolatileQueue {
            tx,
            completed: Arc::new(AtomicBool::new(false)),
        },
        VolatileReader { rx },
    )
}

/// Multi-producer write half; clones share completion state
#[derive(Clone)]
pub struct VolatileQueue {
    tx: mpsc::UnboundedSender<Bytes>,
    completed: Arc<AtomicBool>,
}

impl VolatileQueue {
    /// Append one frame; non-blocking, multi-producer safe
    ///
    /// Returns `false` once the queue is completed or the reader is gone.
    pub fn write(&self, frame: Bytes) -> bool {
        if self.completed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(frame).is_ok()
    }

    /// Declare that no more frames will ever be written
    ///
    /// Pushes the stream-end sentinel; idempotent. Returns `true` for the
    /// call that performed the completion.
    pub fn complete(&self) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(Bytes::from_static(&STREAM_END));
        true
    }

    /// True once [`complete`](Self::complete) has been called
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// Single-consumer read half
pub struct VolatileReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl VolatileReader {
    /// Yield the next frame, suspending while the queue is empty
    ///
    /// Returns `None` only when every writer is gone and the queue is
    /// drained; the in-band stream-end sentinel normally arrives first.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
