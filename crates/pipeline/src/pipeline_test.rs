//! End-to-end pipeline tests over the durable queue backing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::tempdir;
use tokio::time::timeout;

use tracepipe_protocol::{Batch, SequencedRecord};
use tracepipe_queue::DurableQueue;

use crate::{EventSink, PipelineOptions, RunningPipeline, SinkError};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct CaptureSink {
    batches: Arc<Mutex<Vec<Vec<SequencedRecord>>>>,
    in_flight: Arc<AtomicBool>,
    overlap_detected: Arc<AtomicBool>,
    fail_all: bool,
    write_delay: Duration,
}

impl CaptureSink {
    fn new() -> Self {
        Self::default()
    }

    fn batch_lens(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// All delivered payloads, concatenated in delivery order
    fn payloads(&self) -> Vec<Vec<u8>> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|r| r.payload().to_vec())
            .collect()
    }
}

#[async_trait]
impl EventSink for CaptureSink {
    async fn write_batch(&mut self, batch: Batch) -> Result<(), SinkError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap_detected.store(true, Ordering::SeqCst);
        }
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        let result = if self.fail_all {
            Err(SinkError::write("injected failure"))
        } else {
            self.batches.lock().push(batch.into_records());
            Ok(())
        };
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn options(batch_size: u64, max_write_delay: Duration) -> PipelineOptions {
    PipelineOptions {
        batch_size,
        max_write_delay,
        flush_on_shutdown: true,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_multi_producer_ordering_preserved() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let sink = CaptureSink::new();
    let pipeline = RunningPipeline::start_durable(
        queue,
        Box::new(sink.clone()),
        options(25, Duration::from_millis(100)),
    )
    .unwrap();
    let metrics = pipeline.metrics();

    let mut tasks = Vec::new();
    for producer_id in 0..4u8 {
        let producer = pipeline.producer();
        tasks.push(tokio::task::spawn_blocking(move || {
            for i in 0..50u32 {
                let mut payload = vec![producer_id];
                payload.extend_from_slice(&i.to_be_bytes());
                assert!(producer.write(payload));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    wait_until(|| metrics.snapshot().records_delivered == 200).await;
    pipeline.shutdown().await.unwrap();

    // Concatenated batches form a permutation that is FIFO per producer.
    let mut next_expected = [0u32; 4];
    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 200);
    for payload in &payloads {
        let producer_id = payload[0] as usize;
        let i = u32::from_be_bytes(payload[1..5].try_into().unwrap());
        assert_eq!(i, next_expected[producer_id], "per-producer FIFO violated");
        next_expected[producer_id] += 1;
    }

    // Batches were delivered one at a time.
    assert!(!sink.overlap_detected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_batch_scenario_two_full_then_timed_remainder() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let sink = CaptureSink::new();
    let pipeline = RunningPipeline::start_durable(
        queue,
        Box::new(sink.clone()),
        options(100, Duration::from_millis(400)),
    )
    .unwrap();

    let producer = pipeline.producer();
    let writer = tokio::task::spawn_blocking(move || {
        for i in 0..250u32 {
            assert!(producer.write(i.to_be_bytes().to_vec()));
            std::thread::sleep(Duration::from_millis(1));
        }
    });
    writer.await.unwrap();

    // Two full batches close on the count trigger; the remaining 50 wait for
    // the time trigger.
    wait_until(|| sink.batches.lock().len() == 3).await;
    assert_eq!(sink.batch_lens(), vec![100, 100, 50]);

    let payloads = sink.payloads();
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(u32::from_be_bytes(payload[..4].try_into().unwrap()), i as u32);
    }

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_single_delivery_in_flight_under_load() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let sink = CaptureSink {
        write_delay: Duration::from_millis(20),
        ..CaptureSink::new()
    };
    let pipeline = RunningPipeline::start_durable(
        queue,
        Box::new(sink.clone()),
        options(5, Duration::from_millis(50)),
    )
    .unwrap();
    let metrics = pipeline.metrics();

    let producer = pipeline.producer();
    for i in 0..50u32 {
        producer.write(i.to_be_bytes().to_vec());
    }

    wait_until(|| metrics.snapshot().records_delivered == 50).await;
    pipeline.shutdown().await.unwrap();

    assert!(!sink.overlap_detected.load(Ordering::SeqCst));
    assert_eq!(metrics.snapshot().batches_delivered, 10);
}

#[tokio::test]
async fn test_failed_batch_replays_after_restart() {
    let dir = tempdir().unwrap();

    // First run: the batch seals but the sink rejects it, so the truncation
    // point never advances past it.
    {
        let queue = DurableQueue::open(dir.path()).unwrap();
        let sink = CaptureSink {
            fail_all: true,
            ..CaptureSink::new()
        };
        let pipeline = RunningPipeline::start_durable(
            queue,
            Box::new(sink),
            options(3, Duration::from_secs(60)),
        )
        .unwrap();

        let producer = pipeline.producer();
        for label in [b"old-0", b"old-1", b"old-2"] {
            producer.write(label.to_vec());
        }

        let mut completion = pipeline.completion();
        timeout(WAIT, completion.wait())
            .await
            .unwrap()
            .expect_err("first run should fail");
        pipeline.shutdown().await.expect_err("shutdown reports the failure");
    }

    // Second run over the same log: the sealed batch is replayed before any
    // newly produced record.
    let queue = DurableQueue::open(dir.path()).unwrap();
    assert_eq!(queue.begin(), 0, "failed delivery must not truncate");

    let sink = CaptureSink::new();
    let pipeline = RunningPipeline::start_durable(
        queue,
        Box::new(sink.clone()),
        options(3, Duration::from_millis(100)),
    )
    .unwrap();

    let producer = pipeline.producer();
    producer.write(b"new-0".to_vec());

    wait_until(|| sink.payloads().len() == 4).await;
    pipeline.shutdown().await.unwrap();

    let payloads = sink.payloads();
    assert_eq!(
        payloads,
        vec![
            b"old-0".to_vec(),
            b"old-1".to_vec(),
            b"old-2".to_vec(),
            b"new-0".to_vec(),
        ],
        "replayed records must precede new ones"
    );
}

#[tokio::test]
async fn test_unflushed_records_survive_shutdown_and_deliver_next_run() {
    let dir = tempdir().unwrap();

    // Shut down with flush disabled: the three records stay in the log.
    {
        let queue = DurableQueue::open(dir.path()).unwrap();
        let sink = CaptureSink::new();
        let pipeline = RunningPipeline::start_durable(
            queue,
            Box::new(sink.clone()),
            PipelineOptions {
                batch_size: 100,
                max_write_delay: Duration::from_secs(60),
                flush_on_shutdown: false,
            },
        )
        .unwrap();

        let producer = pipeline.producer();
        for i in 0..3u32 {
            producer.write(i.to_be_bytes().to_vec());
        }
        pipeline.shutdown().await.unwrap();
        assert!(sink.batches.lock().is_empty());
    }

    // Next run picks them up via the time trigger.
    let queue = DurableQueue::open(dir.path()).unwrap();
    let sink = CaptureSink::new();
    let pipeline = RunningPipeline::start_durable(
        queue,
        Box::new(sink.clone()),
        options(100, Duration::from_millis(80)),
    )
    .unwrap();

    wait_until(|| sink.payloads().len() == 3).await;
    pipeline.shutdown().await.unwrap();
}
