//! FlushState - shared trigger primitives for batch boundaries
//!
//! One `FlushState` is shared by every producer thread and the time-trigger
//! task of a pipeline. It owns the per-write batch counter and the
//! last-flush tick. Both are plain atomics; no path through here ever
//! blocks.
//!
//! # Tick arithmetic
//!
//! The last-flush stamp is a millisecond tick counter. Elapsed time is
//! computed with **wrapping** subtraction, never direct comparison: the tick
//! source is allowed to wrap from its maximum value back through zero, and
//! modular subtraction stays correct across that boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared atomic counter + last-flush tick driving both batch triggers
#[derive(Debug)]
pub struct FlushState {
    /// Records appended since the last boundary sentinel
    counter: AtomicU64,

    /// Millisecond tick of the last boundary sentinel
    last_flush_ticks: AtomicU64,

    /// Tick origin for this process
    epoch: Instant,
}

impl FlushState {
    /// Create a new state with the counter at zero and the flush stamp at now
    pub fn new() -> Self {
        let epoch = Instant::now();
        Self {
            counter: AtomicU64::new(0),
            last_flush_ticks: AtomicU64::new(0),
            epoch,
        }
    }

    #[inline]
    fn now_ticks(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Count one appended record; returns `true` for exactly the caller whose
    /// increment lands on `batch_size`
    ///
    /// That caller (and only that caller) must write the boundary sentinel.
    /// The exact-match test is what keeps the sentinel unique under
    /// concurrent producers: several threads may increment nearly
    /// simultaneously, but `fetch_add` hands each a distinct value and only
    /// one of them sees `batch_size`. The threshold is consumed by a checked
    /// subtraction rather than a store so increments that raced past the
    /// threshold are carried into the next batch instead of being wiped, and
    /// so a [`mark_flushed`](Self::mark_flushed) landing in between cannot
    /// wrap the counter: if the time trigger already zeroed it, the win is
    /// forfeited and the trigger's own sentinel stands.
    pub fn try_advance(&self, batch_size: u64) -> bool {
        debug_assert!(batch_size > 0);
        let count = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        if count == batch_size {
            let claimed = self
                .counter
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                    c.checked_sub(batch_size)
                })
                .is_ok();
            if claimed {
                self.stamp();
            }
            return claimed;
        }
        false
    }

    /// Reset the counter and stamp the flush tick (time trigger path)
    pub fn mark_flushed(&self) {
        self.counter.store(0, Ordering::Release);
        self.stamp();
    }

    /// Time since the last boundary sentinel, wraparound-safe
    pub fn elapsed_since_last_flush(&self) -> Duration {
        let last = self.last_flush_ticks.load(Ordering::Acquire);
        Duration::from_millis(self.now_ticks().wrapping_sub(last))
    }

    /// Records counted toward the next boundary (diagnostic)
    pub fn pending(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    #[inline]
    fn stamp(&self) {
        self.last_flush_ticks.store(self.now_ticks(), Ordering::Release);
    }
}

impl Default for FlushState {
    fn default() -> Self {
        Self::new()
    }
}
