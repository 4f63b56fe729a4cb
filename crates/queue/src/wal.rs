//! DurableQueue - append-only on-disk log with commit and truncate watermarks
//!
//! # On-disk layout
//!
//! Two files under the queue directory:
//!
//! ```text
//! queue.log    [u32 BE frame len][frame bytes] ... appended frames
//! queue.meta   [u64 BE begin][u64 BE committed][u64 BE base]
//! ```
//!
//! Positions are logical byte offsets into the log; `base` is the logical
//! position of file byte 0 and only moves when the drained log is physically
//! reclaimed, so positions stay monotonic across reclamation.
//!
//! # Durability protocol
//!
//! Appends go into an in-memory pending region under a short lock - a
//! producer thread never touches the device. A commit moves the pending
//! bytes to the file, fsyncs, and only then persists the new commit
//! watermark (via write-to-temp + rename), so the watermark is never
//! observable ahead of durable data. Scans only ever read below the commit
//! watermark.
//!
//! # Recovery
//!
//! On open, any bytes past the commit watermark are torn remnants of a crash
//! and are dropped. The consumer resumes scanning at the truncation point
//! (`begin`), replaying frames that were delivered but never truncated -
//! the source of the pipeline's at-least-once guarantee.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::Result;

/// Log file name within the queue directory
const LOG_FILE: &str = "queue.log";

/// Watermark file name within the queue directory
const META_FILE: &str = "queue.meta";

/// Temporary watermark file used for atomic replacement
const META_TMP: &str = "queue.meta.tmp";

/// Bytes of length prefix per frame
const FRAME_HEADER_LEN: u64 = 4;

/// Size of the persisted watermark record
const META_LEN: usize = 24;

/// Durable multi-producer/single-consumer queue
///
/// Cloning is cheap; all clones share the same log. Appends may come from
/// any thread, but only a single [`scan`](DurableQueue::scan) at a time is
/// supported.
#[derive(Clone)]
pub struct DurableQueue {
    shared: Arc<Shared>,
}

struct Shared {
    dir: PathBuf,

    /// Producer-side state; the lock is held only for memory writes
    append: Mutex<AppendState>,

    /// Serializes commits, truncation, and watermark persistence
    committer: Mutex<CommitState>,

    /// Durable boundary: scans never read at or past this position's frontier
    committed: AtomicU64,

    /// Truncation point: lowest position still guaranteed readable
    begin: AtomicU64,

    /// Logical position of log file byte 0
    base: AtomicU64,

    closed: AtomicBool,

    /// Wakes a scan blocked on the commit watermark
    data_ready: Notify,

    /// Wakes the commit worker
    commit_requested: Notify,
}

struct AppendState {
    /// Frames appended but not yet committed
    pending: Vec<u8>,

    /// Next write position
    tail: u64,
}

struct CommitState {
    file: File,
}

/// One frame yielded by a scan
#[derive(Debug, Clone)]
pub struct ScannedFrame {
    /// Raw frame bytes (record or sentinel)
    pub frame: Bytes,

    /// Logical position of the frame's length prefix
    pub position: u64,

    /// Logical position one past the frame; the truncation target once the
    /// frame's batch has been delivered
    pub end_position: u64,
}

impl ScannedFrame {
    /// Frame length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    /// True for zero-length frames (never produced by the pipeline)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

impl DurableQueue {
    /// Open or create a durable queue in `dir`
    ///
    /// Recovers watermarks from a previous run and drops torn bytes past the
    /// commit watermark.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let (begin, committed, base) = read_meta(&dir)?;
        if base > begin || begin > committed {
            return Err(QueueError::Corrupt { position: begin });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOG_FILE))?;

        // Anything past the commit watermark is a torn append from a crash.
        let durable_len = committed - base;
        let file_len = file.metadata()?.len();
        if file_len < durable_len {
            return Err(QueueError::Corrupt { position: base + file_len });
        }
        if file_len > durable_len {
            tracing::warn!(
                torn_bytes = file_len - durable_len,
                committed,
                "dropping uncommitted log tail from previous run"
            );
            file.set_len(durable_len)?;
            file.sync_data()?;
        }

        Ok(Self {
            shared: Arc::new(Shared {
                dir,
                append: Mutex::new(AppendState {
                    pending: Vec::new(),
                    tail: committed,
                }),
                committer: Mutex::new(CommitState { file }),
                committed: AtomicU64::new(committed),
                begin: AtomicU64::new(begin),
                base: AtomicU64::new(base),
                closed: AtomicBool::new(false),
                data_ready: Notify::new(),
                commit_requested: Notify::new(),
            }),
        })
    }

    /// Append one frame without blocking on I/O
    ///
    /// Multi-producer safe; each append receives a distinct, strictly
    /// increasing position. Returns the new tail position. Fails only when
    /// the queue is closed or the frame cannot be represented.
    pub fn try_append(&self, frame: &[u8]) -> Result<u64> {
        if frame.len() > u32::MAX as usize {
            return Err(QueueError::FrameTooLarge { len: frame.len() });
        }
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let mut append = self.shared.append.lock();
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        append.pending.reserve(FRAME_HEADER_LEN as usize + frame.len());
        append
            .pending
            .extend_from_slice(&(frame.len() as u32).to_be_bytes());
        append.pending.extend_from_slice(frame);
        append.tail += FRAME_HEADER_LEN + frame.len() as u64;
        Ok(append.tail)
    }

    /// Force pending appends durable, blocking the calling thread
    pub fn commit_blocking(&self) -> Result<()> {
        do_commit(&self.shared)
    }

    /// Force pending appends durable, suspending the calling task
    pub async fn commit(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        task::spawn_blocking(move || do_commit(&shared))
            .await
            .map_err(|e| QueueError::Background(e.to_string()))?
    }

    /// Ask the commit worker to commit soon; never blocks
    pub fn request_commit(&self) {
        self.shared.commit_requested.notify_one();
    }

    /// Background commit loop; run as a task alongside the consumer
    ///
    /// Commits whenever [`request_commit`](Self::request_commit) has been
    /// called, and once more on cancellation. Exits on the first commit
    /// error; a broken device will then surface through the consumer's own
    /// blocking commit.
    pub async fn run_commit_worker(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(error) = self.commit().await {
                        tracing::warn!(%error, "final commit on shutdown failed");
                    }
                    return;
                }
                _ = self.shared.commit_requested.notified() => {
                    if let Err(error) = self.commit().await {
                        tracing::error!(%error, "background commit failed, stopping commit worker");
                        return;
                    }
                }
            }
        }
    }

    /// Begin a lazy, infinite scan at `from`
    ///
    /// The stream yields committed frames in position order and suspends
    /// when it catches up to the commit watermark. `cancel` releases a
    /// blocked wait promptly. Not restartable; one scan at a time.
    pub fn scan(&self, from: u64, cancel: CancellationToken) -> Result<RecordStream> {
        let begin = self.shared.begin.load(Ordering::Acquire);
        if from < begin {
            return Err(QueueError::ScanBelowTruncation { from, begin });
        }
        let file = File::open(self.shared.dir.join(LOG_FILE))?;
        Ok(RecordStream {
            shared: Arc::clone(&self.shared),
            file: Some(file),
            position: from,
            cancel,
        })
    }

    /// Declare every frame below `upto` consumed, suspending the caller
    ///
    /// Must only be called after the corresponding batch has been durably
    /// accepted downstream. Physical reclamation is deferred until the log
    /// fully drains, at which point the file is truncated and the position
    /// base remapped.
    pub async fn truncate(&self, upto: u64) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        task::spawn_blocking(move || do_truncate(&shared, upto))
            .await
            .map_err(|e| QueueError::Background(e.to_string()))?
    }

    /// Blocking form of [`truncate`](Self::truncate)
    pub fn truncate_blocking(&self, upto: u64) -> Result<()> {
        do_truncate(&self.shared, upto)
    }

    /// Close the queue: further appends fail and a drained scan terminates
    ///
    /// Call [`commit`](Self::commit) first if pending appends must survive.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.data_ready.notify_waiters();
        self.shared.commit_requested.notify_waiters();
    }

    /// True once [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Current truncation point
    pub fn begin(&self) -> u64 {
        self.shared.begin.load(Ordering::Acquire)
    }

    /// Current commit watermark
    pub fn committed(&self) -> u64 {
        self.shared.committed.load(Ordering::Acquire)
    }

    /// Next write position, including uncommitted appends
    pub fn tail(&self) -> u64 {
        self.shared.append.lock().tail
    }
}

/// Lazy infinite stream over committed frames
///
/// Produced by [`DurableQueue::scan`]; the sole consumer of a queue drives
/// this. `next` suspends while no committed data exists and returns `None`
/// on cancellation or after the queue is closed and drained.
pub struct RecordStream {
    shared: Arc<Shared>,
    /// Taken while a blocking read is in flight
    file: Option<File>,
    position: u64,
    cancel: CancellationToken,
}

impl RecordStream {
    /// Yield the next committed frame, suspending until one exists
    pub async fn next(&mut self) -> Option<Result<ScannedFrame>> {
        loop {
            // Arm the notification before checking the watermark so a commit
            // landing in between cannot be missed.
            let notified = self.shared.data_ready.notified();
            let committed = self.shared.committed.load(Ordering::Acquire);
            if self.position < committed {
                // Release the armed notification before the read borrows the
                // stream mutably; this pass does not wait.
                drop(notified);
                return Some(self.read_frame(committed).await);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Position of the next frame this stream will yield
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads run on the blocking pool, like commit and truncate
    async fn read_frame(&mut self, committed: u64) -> Result<ScannedFrame> {
        let base = self.shared.base.load(Ordering::Acquire);
        let position = self.position;
        let offset = position
            .checked_sub(base)
            .ok_or(QueueError::Corrupt { position })?;

        let mut file = self
            .file
            .take()
            .ok_or_else(|| QueueError::Background("scan file handle lost".into()))?;
        let (file, outcome) = task::spawn_blocking(move || {
            let outcome = read_frame_at(&mut file, offset, position, committed);
            (file, outcome)
        })
        .await
        .map_err(|e| QueueError::Background(e.to_string()))?;
        self.file = Some(file);

        let scanned = outcome?;
        self.position = scanned.end_position;
        Ok(scanned)
    }
}

fn read_frame_at(file: &mut File, offset: u64, position: u64, committed: u64) -> Result<ScannedFrame> {
    file.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; FRAME_HEADER_LEN as usize];
    file.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as u64;

    let end_position = position + FRAME_HEADER_LEN + len;
    if end_position > committed {
        // A frame always becomes durable in one piece; a length pointing
        // past the watermark means the log is damaged.
        return Err(QueueError::Corrupt { position });
    }

    let mut frame = vec![0u8; len as usize];
    file.read_exact(&mut frame)?;

    Ok(ScannedFrame {
        frame: Bytes::from(frame),
        position,
        end_position,
    })
}

/// Move pending bytes to the file, fsync, then persist the watermark
fn do_commit(shared: &Shared) -> Result<()> {
    let mut committer = shared.committer.lock();

    let (chunk, new_committed) = {
        let mut append = shared.append.lock();
        if append.pending.is_empty() {
            return Ok(());
        }
        (mem::take(&mut append.pending), append.tail)
    };

    let committed = shared.committed.load(Ordering::Acquire);
    let base = shared.base.load(Ordering::Acquire);
    committer.file.seek(SeekFrom::Start(committed - base))?;
    committer.file.write_all(&chunk)?;
    committer.file.sync_data()?;

    persist_meta(
        &shared.dir,
        shared.begin.load(Ordering::Acquire),
        new_committed,
        base,
    )?;

    shared.committed.store(new_committed, Ordering::Release);
    shared.data_ready.notify_waiters();
    Ok(())
}

fn do_truncate(shared: &Shared, upto: u64) -> Result<()> {
    let committer = shared.committer.lock();

    if upto <= shared.begin.load(Ordering::Acquire) {
        return Ok(());
    }
    let committed = shared.committed.load(Ordering::Acquire);
    if upto > committed {
        return Err(QueueError::TruncateBeyondCommit { upto, committed });
    }

    shared.begin.store(upto, Ordering::Release);

    // Physical reclamation: once the log is fully drained, drop the file
    // contents and remap the base so positions stay monotonic.
    let mut base = shared.base.load(Ordering::Acquire);
    {
        let append = shared.append.lock();
        if upto == committed && append.pending.is_empty() && append.tail == committed {
            committer.file.set_len(0)?;
            committer.file.sync_data()?;
            shared.base.store(upto, Ordering::Release);
            base = upto;
            tracing::debug!(position = upto, "reclaimed drained queue log");
        }
    }

    persist_meta(&shared.dir, upto, committed, base)?;
    Ok(())
}

fn read_meta(dir: &Path) -> Result<(u64, u64, u64)> {
    let path = dir.join(META_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0, 0)),
        Err(e) => return Err(e.into()),
    };
    if bytes.len() != META_LEN {
        return Err(QueueError::Corrupt { position: 0 });
    }
    let begin = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let committed = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
    let base = u64::from_be_bytes(bytes[16..24].try_into().unwrap());
    Ok((begin, committed, base))
}

/// Atomically replace the watermark file (write temp, fsync, rename)
fn persist_meta(dir: &Path, begin: u64, committed: u64, base: u64) -> Result<()> {
    let mut bytes = [0u8; META_LEN];
    bytes[0..8].copy_from_slice(&begin.to_be_bytes());
    bytes[8..16].copy_from_slice(&committed.to_be_bytes());
    bytes[16..24].copy_from_slice(&base.to_be_bytes());

    let tmp = dir.join(META_TMP);
    let mut file = File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, dir.join(META_FILE))?;
    Ok(())
}
