//! Time trigger - flushes partial batches that have waited too long
//!
//! The count trigger lives on the producer path (`ProducerHandle::write`);
//! this task is its time-based sibling. It fires independently of producer
//! activity and writes the same boundary sentinel into the same queue, so
//! the assembler never knows which trigger sealed a batch. A sentinel that
//! closes an empty batch is silently skipped downstream, which makes
//! spurious timer fires harmless.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tracepipe_queue::FlushState;

use crate::pipeline::QueueWriter;

/// Periodic flush loop; runs until cancelled
pub(crate) async fn run_time_trigger(
    writer: QueueWriter,
    flush: Arc<FlushState>,
    max_write_delay: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(max_write_delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                // Wraparound-safe elapsed check; the count trigger may have
                // flushed more recently than our last tick.
                if flush.elapsed_since_last_flush() >= max_write_delay {
                    let pending = flush.pending();
                    flush.mark_flushed();
                    writer.write_sentinel();
                    writer.request_commit();
                    tracing::trace!(pending, "time trigger sealed batch");
                }
            }
        }
    }
}
