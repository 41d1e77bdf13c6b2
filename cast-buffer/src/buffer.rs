//! Ring buffer between network producer and decoder consumer
//!
//! One producer thread (the RPC handler delivering data chunks) and one
//! consumer thread (the decoder pulling bytes) share a fixed-capacity ring.
//! A single mutex guards cursor movement; atomic `unread`/`free` counters
//! carry the occupancy invariant (`unread + free == capacity`); two
//! condition variables gate the blocking points: demanded-data arrival and
//! seek satisfaction.
//!
//! Seeks never reuse buffered bytes: for a network-sourced stream any seek
//! flushes the ring, asks the remote producer to resume from the target
//! offset, and blocks until the first write arrives or a fixed timeout
//! fires.

use crate::config::BufferConfig;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Opaque identifier of the remote producer session feeding a buffer
pub type SessionHandle = u32;

type SeekRequestFn = dyn Fn(SessionHandle, u64) + Send + Sync;
type DemandDataFn = dyn Fn(SessionHandle, usize) + Send + Sync;

/// Buffer errors
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("seek target {target} outside the file bounds [0, {file_size}]")]
    SeekOutOfRange { target: i64, file_size: u64 },

    #[error("seek to offset {0} timed out waiting for data")]
    SeekTimeout(u64),

    #[error("no seek request handler installed")]
    NoSeekHandler,
}

/// Seek origin, mirroring the decoder-facing seek modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Absolute offset from the start of the stream
    Start,
    /// Relative to the current absolute read position
    Current,
    /// Relative to the end of the stream (logical file size)
    End,
}

/// Buffer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// No fill or seek activity
    Idle,
    /// Buffering-ahead is actively pulling data
    Buffering,
    /// A seek is in flight; the next successful write satisfies it
    Seeking,
}

struct Inner {
    data: Box<[u8]>,
    write_pos: usize,
    read_pos: usize,
    /// Monotonic byte offset into the logical stream, advanced by reads
    absolute_read_pos: u64,
    /// Absolute-offset bounds of the data currently resident
    buffered_low: u64,
    buffered_high: u64,
    /// Logical size of the media file being streamed
    file_size: u64,
    state: BufferState,
}

/// Per-session streaming ring buffer
///
/// Created once per playback session with a fixed capacity; [`reset`]
/// clears cursors and counters but keeps the allocation. Exactly one
/// producer and one consumer thread may operate on it concurrently.
///
/// [`reset`]: StreamBuffer::reset
pub struct StreamBuffer {
    cfg: BufferConfig,
    inner: Mutex<Inner>,
    /// Mutex/condvar pair for reads waiting on demanded data
    data_lock: Mutex<()>,
    data_cv: Condvar,
    /// Mutex/condvar pair for a seek waiting on its satisfying write
    seek_lock: Mutex<()>,
    seek_cv: Condvar,
    unread: AtomicUsize,
    free: AtomicUsize,
    eof: AtomicBool,
    /// A demand-data request is outstanding; cleared by the next write
    request_pending: AtomicBool,
    /// A seek request is outstanding; cleared by the next write
    seek_pending: AtomicBool,
    session: AtomicU32,
    seek_request: RwLock<Option<Box<SeekRequestFn>>>,
    demand_data: RwLock<Option<Box<DemandDataFn>>>,
}

impl StreamBuffer {
    /// Create a buffer with the given configuration.
    pub fn new(cfg: BufferConfig) -> Self {
        let capacity = cfg.capacity;
        StreamBuffer {
            inner: Mutex::new(Inner {
                data: vec![0u8; capacity].into_boxed_slice(),
                write_pos: 0,
                read_pos: 0,
                absolute_read_pos: 0,
                buffered_low: 0,
                buffered_high: 0,
                file_size: 0,
                state: BufferState::Idle,
            }),
            cfg,
            data_lock: Mutex::new(()),
            data_cv: Condvar::new(),
            seek_lock: Mutex::new(()),
            seek_cv: Condvar::new(),
            unread: AtomicUsize::new(0),
            free: AtomicUsize::new(capacity),
            eof: AtomicBool::new(false),
            request_pending: AtomicBool::new(false),
            seek_pending: AtomicBool::new(false),
            session: AtomicU32::new(0),
            seek_request: RwLock::new(None),
            demand_data: RwLock::new(None),
        }
    }

    /// Install the seek-request callback.
    ///
    /// Invoked by [`seek`](StreamBuffer::seek) with the session handle and
    /// the absolute target offset; the transport must ask the remote
    /// producer to resume sending from that offset.
    pub fn set_seek_request<F>(&self, cb: F)
    where
        F: Fn(SessionHandle, u64) + Send + Sync + 'static,
    {
        *self.seek_request.write() = Some(Box::new(cb));
    }

    /// Install the demand-data callback.
    ///
    /// Invoked by the backpressure logic with the session handle and a
    /// block-size hint; must result in the producer sending another chunk.
    pub fn set_demand_data<F>(&self, cb: F)
    where
        F: Fn(SessionHandle, usize) + Send + Sync + 'static,
    {
        *self.demand_data.write() = Some(Box::new(cb));
    }

    pub fn capacity(&self) -> usize {
        self.cfg.capacity
    }

    pub fn unread(&self) -> usize {
        self.unread.load(Ordering::Acquire)
    }

    pub fn free(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    pub fn state(&self) -> BufferState {
        self.inner.lock().state
    }

    pub fn seeking(&self) -> bool {
        self.state() == BufferState::Seeking
    }

    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    /// Mark end of stream. Wakes a reader blocked on demanded data so it
    /// can observe the EOF condition.
    pub fn set_eof(&self, eof: bool) {
        self.eof.store(eof, Ordering::Release);
        if eof {
            let _guard = self.data_lock.lock();
            self.request_pending.store(false, Ordering::Release);
            self.data_cv.notify_all();
        }
    }

    pub fn set_session_handle(&self, handle: SessionHandle) {
        self.session.store(handle, Ordering::Release);
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.session.load(Ordering::Acquire)
    }

    pub fn set_file_size(&self, size: u64) {
        self.inner.lock().file_size = size;
    }

    pub fn file_size(&self) -> u64 {
        self.inner.lock().file_size
    }

    /// Absolute byte offset of the next read
    pub fn absolute_read_pos(&self) -> u64 {
        self.inner.lock().absolute_read_pos
    }

    /// Reset the buffer to its initialised state, keeping the allocation.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.reset_locked(&mut inner);
        drop(inner);

        // Release a reader parked on the data condvar; it observes an
        // empty buffer and returns.
        let _guard = self.data_lock.lock();
        self.data_cv.notify_all();
    }

    fn reset_locked(&self, inner: &mut Inner) {
        inner.write_pos = 0;
        inner.read_pos = 0;
        inner.absolute_read_pos = 0;
        inner.buffered_low = 0;
        inner.buffered_high = 0;
        inner.state = BufferState::Idle;
        self.unread.store(0, Ordering::Release);
        self.free.store(self.cfg.capacity, Ordering::Release);
        self.eof.store(false, Ordering::Release);
        self.request_pending.store(false, Ordering::Release);
        self.seek_pending.store(false, Ordering::Release);
    }

    /// Kick off the initial fill by firing a demand-data signal.
    ///
    /// Returns false when no demand handler is installed.
    pub fn prime(&self) -> bool {
        if self.demand_data.read().is_none() {
            return false;
        }
        if self.cfg.read_ahead {
            self.inner.lock().state = BufferState::Buffering;
        }
        self.fire_demand();
        true
    }

    /// Write a chunk into the buffer.
    ///
    /// Copies as many bytes as fit into free space, in at most two
    /// contiguous regions (tail of the ring, then wrapped to the head);
    /// unread data is never overwritten. Returns the number of bytes
    /// written, which is less than `data.len()` when free space is
    /// insufficient; the producer retries or sizes chunks conservatively.
    ///
    /// A successful write while a seek is in flight satisfies the seek and
    /// wakes the seek waiter instead of triggering buffering-ahead.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let free = self.free.load(Ordering::Acquire);
        let n = free.min(data.len());
        if n == 0 {
            return 0;
        }

        let cap = inner.data.len();
        let wp = inner.write_pos;
        let first = n.min(cap - wp);
        inner.data[wp..wp + first].copy_from_slice(&data[..first]);
        if n > first {
            let rest = n - first;
            inner.data[..rest].copy_from_slice(&data[first..n]);
        }
        inner.write_pos = (wp + n) % cap;
        inner.buffered_high += n as u64;
        self.free.fetch_sub(n, Ordering::AcqRel);
        self.unread.fetch_add(n, Ordering::AcqRel);

        let seeking = inner.state == BufferState::Seeking;
        drop(inner);

        if seeking {
            // The seek waiter owns the Seeking -> Idle transition.
            let _guard = self.seek_lock.lock();
            self.seek_pending.store(false, Ordering::Release);
            self.seek_cv.notify_one();
        } else {
            {
                let _guard = self.data_lock.lock();
                self.request_pending.store(false, Ordering::Release);
                self.data_cv.notify_one();
            }
            if self.cfg.read_ahead && self.free.load(Ordering::Acquire) > self.cfg.block_size {
                self.fire_demand();
            }
        }

        if n < data.len() {
            warn!(
                requested = data.len(),
                written = n,
                "chunk larger than free space, truncated"
            );
        }

        n
    }

    /// Read up to `out.len()` bytes from the buffer.
    ///
    /// When fewer than `out.len()` unread bytes are available and EOF has
    /// not been reached, a demand-data signal fires first and the call
    /// blocks (bounded) for arrival. Returns 0 both at EOF-and-drained and
    /// when the buffer is still empty after the bounded wait; the caller
    /// distinguishes via [`is_eof`](StreamBuffer::is_eof).
    pub fn read(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }

        if !self.is_eof() && self.unread() < out.len() {
            self.request_data();
        }

        let mut inner = self.inner.lock();
        let unread = self.unread.load(Ordering::Acquire);
        if unread == 0 {
            trace!(eof = self.is_eof(), "read on empty buffer");
            return 0;
        }

        let n = unread.min(out.len());
        let cap = inner.data.len();
        let rp = inner.read_pos;
        let first = n.min(cap - rp);
        out[..first].copy_from_slice(&inner.data[rp..rp + first]);
        if n > first {
            out[first..n].copy_from_slice(&inner.data[..n - first]);
        }
        inner.read_pos = (rp + n) % cap;
        inner.absolute_read_pos += n as u64;
        self.unread.fetch_sub(n, Ordering::AcqRel);
        self.free.fetch_add(n, Ordering::AcqRel);
        drop(inner);

        // Steady-state backpressure: once a read frees up a full block,
        // ask the producer for the next one.
        if !self.is_eof() && self.cfg.read_ahead && self.free() >= self.cfg.block_size {
            self.fire_demand();
        }

        n
    }

    /// Seek to a position in the logical stream.
    ///
    /// Validates the target against `[0, file_size]`, flushes the ring,
    /// asks the remote producer to resume from the target offset, and
    /// blocks until the satisfying write arrives or the configured timeout
    /// fires. Concurrent seeks are not supported: the consumer must not
    /// issue reads while its own seek is outstanding.
    pub fn seek(&self, origin: SeekOrigin, offset: i64) -> Result<u64, BufferError> {
        let mut inner = self.inner.lock();
        let file_size = inner.file_size;
        let target = match origin {
            SeekOrigin::Start => offset,
            SeekOrigin::Current => inner.absolute_read_pos as i64 + offset,
            SeekOrigin::End => file_size as i64 - offset,
        };

        if target < 0 || target as u64 > file_size {
            return Err(BufferError::SeekOutOfRange { target, file_size });
        }
        let target = target as u64;

        debug!(target, "seek: flushing buffer, requesting remote data");

        // Network-sourced stream: whatever is buffered is stale after any
        // seek. Flush and re-anchor the absolute bounds at the target.
        self.reset_locked(&mut inner);
        inner.buffered_low = target;
        inner.buffered_high = target;
        inner.absolute_read_pos = target;
        inner.state = BufferState::Seeking;
        drop(inner);

        {
            let cb = self.seek_request.read();
            let Some(cb) = cb.as_ref() else {
                self.inner.lock().state = BufferState::Idle;
                return Err(BufferError::NoSeekHandler);
            };
            self.seek_pending.store(true, Ordering::Release);
            cb(self.session_handle(), target);
        }

        let mut guard = self.seek_lock.lock();
        let deadline = Instant::now() + self.cfg.seek_timeout;
        while self.seek_pending.load(Ordering::Acquire) {
            if self.seek_cv.wait_until(&mut guard, deadline).timed_out() {
                drop(guard);
                self.seek_pending.store(false, Ordering::Release);
                self.inner.lock().state = BufferState::Idle;
                warn!(target, "seek timed out");
                return Err(BufferError::SeekTimeout(target));
            }
        }
        drop(guard);

        self.inner.lock().state = BufferState::Idle;
        Ok(target)
    }

    /// Fire a demand-data signal unless one is already outstanding.
    fn fire_demand(&self) {
        let cb = self.demand_data.read();
        let Some(cb) = cb.as_ref() else {
            return;
        };
        if self
            .request_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A request is already in flight; the producer answers once.
            return;
        }
        trace!(hint = self.cfg.block_size, "demand-data signal");
        cb(self.session_handle(), self.cfg.block_size);
    }

    /// Fire a demand signal and block (bounded) for data to arrive.
    fn request_data(&self) {
        self.fire_demand();
        if self.demand_data.read().is_none() {
            return;
        }

        let mut guard = self.data_lock.lock();
        let deadline = Instant::now() + self.cfg.data_wait;
        while self.request_pending.load(Ordering::Acquire) {
            if self.data_cv.wait_until(&mut guard, deadline).timed_out() {
                trace!("demand-data wait timed out");
                break;
            }
        }
    }
}
