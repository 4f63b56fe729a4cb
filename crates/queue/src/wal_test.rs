//! DurableQueue tests: append/commit/scan/truncate and crash recovery

use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{DurableQueue, QueueError};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_append_positions_are_strictly_increasing() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();

    // Each frame occupies 4 bytes of header plus its body.
    assert_eq!(queue.try_append(b"aaa").unwrap(), 7);
    assert_eq!(queue.try_append(b"").unwrap(), 11);
    assert_eq!(queue.try_append(b"bb").unwrap(), 17);
    assert_eq!(queue.tail(), 17);
    assert_eq!(queue.committed(), 0);
}

#[tokio::test]
async fn test_scan_sees_only_committed_frames() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();
    let mut stream = queue.scan(0, cancel.clone()).unwrap();

    queue.try_append(b"first").unwrap();

    // Nothing committed yet: the scan must suspend.
    assert!(
        timeout(Duration::from_millis(100), stream.next()).await.is_err(),
        "scan yielded an uncommitted frame"
    );

    queue.commit().await.unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"first");
    assert_eq!(frame.position, 0);
    assert_eq!(frame.end_position, 9);
}

#[tokio::test]
async fn test_scan_resumes_when_more_data_commits() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let mut stream = queue.scan(0, CancellationToken::new()).unwrap();

    queue.try_append(b"a").unwrap();
    queue.commit().await.unwrap();
    let first = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.frame.as_ref(), b"a");

    // Commit lands while the scan is suspended.
    let writer = queue.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.try_append(b"b").unwrap();
        writer.commit().await.unwrap();
    });

    let second = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(second.frame.as_ref(), b"b");
    assert_eq!(second.position, first.end_position);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_cancellation_releases_blocked_scan() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();
    let mut stream = queue.scan(0, cancel.clone()).unwrap();

    let waiter = tokio::spawn(async move { stream.next().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = timeout(WAIT, waiter).await.unwrap().unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_truncate_then_fresh_scan_starts_at_begin() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();

    queue.try_append(b"old").unwrap();
    let keep_from = queue.try_append(b"old2").unwrap();
    queue.try_append(b"new").unwrap();
    queue.commit().await.unwrap();

    queue.truncate(keep_from).await.unwrap();
    assert_eq!(queue.begin(), keep_from);

    // Scanning below the truncation point is refused.
    assert!(matches!(
        queue.scan(0, CancellationToken::new()),
        Err(QueueError::ScanBelowTruncation { .. })
    ));

    let mut stream = queue.scan(keep_from, CancellationToken::new()).unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"new");
}

#[tokio::test]
async fn test_drained_log_is_physically_reclaimed() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();

    let end = queue.try_append(&[0u8; 128]).unwrap();
    queue.commit().await.unwrap();
    queue.truncate(end).await.unwrap();

    let log_len = std::fs::metadata(dir.path().join("queue.log")).unwrap().len();
    assert_eq!(log_len, 0);

    // Positions stay monotonic across reclamation.
    let next = queue.try_append(b"after").unwrap();
    assert!(next > end);
    queue.commit().await.unwrap();

    let mut stream = queue.scan(end, CancellationToken::new()).unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"after");
    assert_eq!(frame.position, end);
}

#[tokio::test]
async fn test_recovery_replays_from_truncation_point() {
    let dir = tempdir().unwrap();
    let delivered_end;
    {
        let queue = DurableQueue::open(dir.path()).unwrap();
        delivered_end = queue.try_append(b"delivered").unwrap();
        queue.try_append(b"sealed-not-truncated").unwrap();
        queue.commit().await.unwrap();
        queue.truncate(delivered_end).await.unwrap();
        // Process "crashes" here: no close, no further truncation.
    }

    let queue = DurableQueue::open(dir.path()).unwrap();
    assert_eq!(queue.begin(), delivered_end);

    let mut stream = queue.scan(queue.begin(), CancellationToken::new()).unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"sealed-not-truncated");
}

#[tokio::test]
async fn test_recovery_drops_uncommitted_tail() {
    let dir = tempdir().unwrap();
    {
        let queue = DurableQueue::open(dir.path()).unwrap();
        queue.try_append(b"durable").unwrap();
        queue.commit().await.unwrap();
        queue.try_append(b"never-committed").unwrap();
        // Crash before the second commit. The pending bytes only lived in
        // memory, so recovery sees just the committed prefix.
    }

    let queue = DurableQueue::open(dir.path()).unwrap();
    assert_eq!(queue.committed(), 11);
    assert_eq!(queue.tail(), 11);

    let mut stream = queue.scan(0, CancellationToken::new()).unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"durable");
}

#[tokio::test]
async fn test_append_fails_after_close() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    queue.close();

    assert!(matches!(queue.try_append(b"x"), Err(QueueError::Closed)));
}

#[tokio::test]
async fn test_close_terminates_drained_scan() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();

    queue.try_append(b"only").unwrap();
    queue.commit().await.unwrap();

    let mut stream = queue.scan(0, CancellationToken::new()).unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"only");

    queue.close();
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_appends_from_many_threads() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();

    let mut tasks = Vec::new();
    for producer in 0..4u8 {
        let queue = queue.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            for i in 0..50u32 {
                let mut frame = vec![producer];
                frame.extend_from_slice(&i.to_be_bytes());
                queue.try_append(&frame).unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    queue.commit().await.unwrap();

    let mut stream = queue.scan(0, CancellationToken::new()).unwrap();
    let mut next_expected = [0u32; 4];
    for _ in 0..200 {
        let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        let producer = frame.frame[0] as usize;
        let i = u32::from_be_bytes(frame.frame[1..5].try_into().unwrap());
        assert_eq!(i, next_expected[producer], "per-producer FIFO violated");
        next_expected[producer] += 1;
    }
}

#[tokio::test]
async fn test_commit_worker_commits_on_request() {
    let dir = tempdir().unwrap();
    let queue = DurableQueue::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    let worker = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run_commit_worker(cancel).await })
    };

    queue.try_append(b"frame").unwrap();
    queue.request_commit();

    let mut stream = queue.scan(0, CancellationToken::new()).unwrap();
    let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.frame.as_ref(), b"frame");

    cancel.cancel();
    timeout(WAIT, worker).await.unwrap().unwrap();
}
