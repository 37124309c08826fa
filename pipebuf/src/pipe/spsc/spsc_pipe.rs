//! SpscPipe - single writer, single reader byte pipe
//!
//! Two cursors, each stored by exactly one side:
//! - `end` - produced-through offset, stored only by the writer
//! - `start` - consumed-through offset, stored only by the reader
//!
//! No CAS and no spin: each side loads the other's cursor with Acquire,
//! copies, then stores its own with Release.
//!
//! Each side also carries a busy flag. A write, or a write span from
//! `write_lock` until it is published, holds the write flag; a second writer
//! arriving meanwhile gets 0 bytes or an empty span instead of aliasing the
//! same region. Same for the read side. [`SpscPipe::split`] makes the flags
//! uncontended by construction.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::insights;
use crate::pipe::common::PaddedCursor;
use crate::pipe::span::{ ReadSpan, SpanOwner, WriteSpan };
use crate::pipe::spsc::{ SpscReader, SpscWriter };
use crate::pipe::storage::Storage;
use crate::pipe::wrap;
use crate::pipe::{ PipeBuffer, PipeConfig, PipeKind };
use crate::sync::atomic::{ AtomicBool, Ordering };

pub struct SpscPipe {
    storage: Storage,
    capacity: usize,
    /// Consumed-through offset (reader)
    start: PaddedCursor,
    /// Produced-through offset (writer)
    end: PaddedCursor,
    /// Held by the write in progress or the outstanding write span
    writing: AtomicBool,
    /// Held by the read in progress or the outstanding read span
    reading: AtomicBool,
}

impl SpscPipe {
    /// Create a heap-backed pipe. `capacity` must be a power of 2.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(PipeConfig::new(capacity)?)
    }

    pub fn with_config(config: PipeConfig) -> Result<Self> {
        config.validate(PipeKind::Spsc)?;
        let storage = Storage::allocate(config.capacity, config.storage)?;

        insights::record_created(PipeKind::Spsc.name(), config.capacity, config.storage.name());

        Ok(Self {
            storage,
            capacity: config.capacity,
            start: PaddedCursor::new(0),
            end: PaddedCursor::new(0),
            writing: AtomicBool::new(false),
            reading: AtomicBool::new(false),
        })
    }

    /// Split into the two single-threaded ends.
    pub fn split(self) -> (SpscWriter, SpscReader) {
        let pipe = Arc::new(self);
        (SpscWriter::new(pipe.clone()), SpscReader::new(pipe))
    }

    /// `(start, end)` snapshot.
    pub fn cursors(&self) -> (u64, u64) {
        let start = self.start.value.load(Ordering::Acquire);
        let end = self.end.value.load(Ordering::Acquire);
        (start, end)
    }

    /// Take a side's busy flag. False when another caller holds it.
    #[inline(always)]
    fn try_enter(flag: &AtomicBool) -> bool {
        !flag.swap(true, Ordering::Acquire)
    }

    #[inline(always)]
    fn leave(flag: &AtomicBool) {
        flag.store(false, Ordering::Release);
    }

    fn copy_in(&self, buf: &[u8]) -> usize {
        let (end, free) = self.writable();
        let io_len = buf.len().min(free);
        if io_len == 0 {
            insights::record_backpressure();
            return 0;
        }

        // SAFETY: the write flag is ours; [end, end + io_len) was consumed by the reader
        unsafe { wrap::copy_in(&self.storage, end, &buf[..io_len]) };
        insights::record_write(io_len);

        self.end.value.store(end + (io_len as u64), Ordering::Release);
        io_len
    }

    fn copy_out(&self, buf: &mut [u8]) -> usize {
        let (start, available) = self.readable();
        let io_len = buf.len().min(available);
        if io_len == 0 {
            insights::record_starved();
            return 0;
        }

        // SAFETY: the read flag is ours; [start, start + io_len) was published by the writer
        unsafe { wrap::copy_out(&self.storage, start, &mut buf[..io_len]) };
        insights::record_read(io_len);

        self.start.value.store(start + (io_len as u64), Ordering::Release);
        io_len
    }

    /// Writer side: own `end`, free bytes.
    #[inline(always)]
    fn writable(&self) -> (u64, usize) {
        let end = self.end.value.load(Ordering::Relaxed);
        let start = self.start.value.load(Ordering::Acquire);
        let used = end.wrapping_sub(start) as usize;
        debug_assert!(used <= self.capacity, "cursor invariant broken: start {} end {}", start, end);
        (end, self.capacity - used)
    }

    /// Reader side: own `start`, published bytes.
    #[inline(always)]
    fn readable(&self) -> (u64, usize) {
        let start = self.start.value.load(Ordering::Relaxed);
        let end = self.end.value.load(Ordering::Acquire);
        let used = end.wrapping_sub(start) as usize;
        debug_assert!(used <= self.capacity, "cursor invariant broken: start {} end {}", start, end);
        (start, used)
    }
}

/// Only one span per side can be live (it holds the side's flag), so
/// `sequence` is always the current cursor.
impl SpanOwner for SpscPipe {
    fn publish_write(&self, sequence: u64, len: usize) {
        self.end.value.store(sequence + (len as u64), Ordering::Release);
        Self::leave(&self.writing);
    }

    fn publish_read(&self, sequence: u64, len: usize) {
        self.start.value.store(sequence + (len as u64), Ordering::Release);
        Self::leave(&self.reading);
    }
}

/// Shared-reference access for code written against [`PipeBuffer`].
///
/// Concurrent callers on one side do not block each other: whoever finds the
/// side busy gets 0 bytes or an empty span.
impl PipeBuffer for SpscPipe {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&self, buf: &[u8]) -> usize {
        if buf.is_empty() || !Self::try_enter(&self.writing) {
            return 0;
        }
        let moved = self.copy_in(buf);
        Self::leave(&self.writing);
        moved
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() || !Self::try_enter(&self.reading) {
            return 0;
        }
        let moved = self.copy_out(buf);
        Self::leave(&self.reading);
        moved
    }

    fn write_lock(&self, len: usize) -> WriteSpan<'_> {
        if len == 0 || !Self::try_enter(&self.writing) {
            return WriteSpan::empty();
        }

        let (end, free) = self.writable();
        let io_len = wrap::contiguous_len(end, len.min(free), self.capacity);
        if io_len == 0 {
            insights::record_backpressure();
            Self::leave(&self.writing);
            return WriteSpan::empty();
        }

        debug_assert!(!wrap::crosses_lap(end, io_len, (self.capacity - 1) as u64));
        let ptr = self.storage.ptr_at((end as usize) & (self.capacity - 1));
        WriteSpan::new(self, ptr, io_len, end)
    }

    fn write_commit(&self, span: WriteSpan<'_>) -> Result<()> {
        span.commit_to(self)
    }

    fn read_lock(&self, len: usize) -> ReadSpan<'_> {
        if len == 0 || !Self::try_enter(&self.reading) {
            return ReadSpan::empty();
        }

        let (start, available) = self.readable();
        let io_len = wrap::contiguous_len(start, len.min(available), self.capacity);
        if io_len == 0 {
            insights::record_starved();
            Self::leave(&self.reading);
            return ReadSpan::empty();
        }

        debug_assert!(!wrap::crosses_lap(start, io_len, (self.capacity - 1) as u64));
        let ptr = self.storage.ptr_at((start as usize) & (self.capacity - 1));
        ReadSpan::new(self, ptr, io_len, start)
    }

    fn read_commit(&self, span: ReadSpan<'_>) -> Result<()> {
        span.commit_to(self)
    }

    /// `start` is loaded before `end`, so an observer racing both sides can
    /// see a gap wider than the buffer; clamp it.
    fn len(&self) -> usize {
        let (start, end) = self.cursors();
        end.wrapping_sub(start).min(self.capacity as u64) as usize
    }

    fn free_space(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }
}

impl fmt::Debug for SpscPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.cursors();
        f.debug_struct("SpscPipe")
            .field("capacity", &self.capacity)
            .field("storage", &self.storage.kind())
            .field("start", &start)
            .field("end", &end)
            .finish()
    }
}
