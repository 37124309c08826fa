//! MPMC (Multi-Producer Multi-Consumer) Pipe
//!
//! Lock-free byte pipe with any number of writers and readers.
//! Every operation is reserve -> copy -> publish:
//! - Reserve: CAS on the packed offsets advances `end_mark` / `start_mark`
//! - Copy: disjoint reservations copy concurrently, in any order
//! - Publish: spin until every earlier reservation on the same side has
//!   published, then advance `end` / `start`
//!
//! Publication is therefore in strict reservation order: readers see bytes
//! in the order writers reserved them, whichever copy finished first.

use std::fmt;

use crate::error::{ PipeError, Result };
use crate::insights;
use crate::pipe::common::PaddedCursor;
use crate::pipe::mpmc::Offsets;
use crate::pipe::span::{ ReadSpan, SpanOwner, WriteSpan };
use crate::pipe::storage::Storage;
use crate::pipe::wrap;
use crate::pipe::{ PipeBuffer, PipeConfig, PipeKind };
use crate::sync::atomic::Ordering;
use crate::sync::spin_loop;

pub struct MpmcPipe {
    storage: Storage,
    capacity: u16,
    /// Packed `Offsets`; the only contended word
    offsets: PaddedCursor,
}

impl MpmcPipe {
    /// Create a heap-backed pipe. `capacity` must be a power of 2 below 65536.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(PipeConfig::new(capacity)?)
    }

    pub fn with_config(config: PipeConfig) -> Result<Self> {
        config.validate(PipeKind::Mpmc)?;
        let storage = Storage::allocate(config.capacity, config.storage)?;
        let capacity = u16::try_from(config.capacity)
            .map_err(|_| PipeError::capacity(config.capacity, "must be below 65536 for mpmc"))?;

        insights::record_created(PipeKind::Mpmc.name(), config.capacity, config.storage.name());

        Ok(Self {
            storage,
            capacity,
            offsets: PaddedCursor::new(Offsets::default().pack()),
        })
    }

    /// Snapshot of the offset quadruple.
    pub fn offsets(&self) -> Offsets {
        Offsets::unpack(self.offsets.value.load(Ordering::Acquire))
    }

    #[inline(always)]
    fn check(&self, pof: &Offsets) {
        debug_assert!(
            pof.occupied() <= self.capacity && pof.reserved() <= self.capacity,
            "offset invariant broken: {:?} capacity {}",
            pof,
            self.capacity
        );
    }

    /// Claim up to `len` bytes for writing by advancing `end_mark`.
    /// Returns the reservation start and length.
    fn reserve_write(&self, len: usize, contiguous: bool) -> Option<(u16, usize)> {
        if len == 0 {
            return None;
        }

        loop {
            let current = self.offsets.value.load(Ordering::Acquire);
            let mut pof = Offsets::unpack(current);
            self.check(&pof);

            let free = (self.capacity - pof.reserved()) as usize;
            let mut io_len = len.min(free);
            if contiguous {
                io_len = wrap::contiguous_len(pof.end_mark as u64, io_len, self.capacity as usize);
            }
            if io_len == 0 {
                insights::record_backpressure();
                return None;
            }

            let end_mark = pof.end_mark;
            pof.end_mark = end_mark.wrapping_add(io_len as u16);

            match
                self.offsets.value.compare_exchange_weak(
                    current,
                    pof.pack(),
                    Ordering::AcqRel,
                    Ordering::Acquire
                )
            {
                Ok(_) => {
                    return Some((end_mark, io_len));
                }
                Err(_) => spin_loop(), // Another writer won
            }
        }
    }

    /// Claim up to `len` published bytes for reading by advancing `start_mark`.
    fn reserve_read(&self, len: usize, contiguous: bool) -> Option<(u16, usize)> {
        if len == 0 {
            return None;
        }

        loop {
            let current = self.offsets.value.load(Ordering::Acquire);
            let mut pof = Offsets::unpack(current);
            self.check(&pof);

            let mut io_len = len.min(pof.readable() as usize);
            if contiguous {
                io_len = wrap::contiguous_len(pof.start_mark as u64, io_len, self.capacity as usize);
            }
            if io_len == 0 {
                insights::record_starved();
                return None;
            }

            let start_mark = pof.start_mark;
            pof.start_mark = start_mark.wrapping_add(io_len as u16);

            match
                self.offsets.value.compare_exchange_weak(
                    current,
                    pof.pack(),
                    Ordering::AcqRel,
                    Ordering::Acquire
                )
            {
                Ok(_) => {
                    return Some((start_mark, io_len));
                }
                Err(_) => spin_loop(), // Another reader won
            }
        }
    }

    /// Spin until `end == from`, then move `end` to `to`.
    fn publish_end(&self, from: u16, to: u16) {
        let mut spins = 0u64;
        loop {
            let current = self.offsets.value.load(Ordering::Acquire);
            let mut pof = Offsets::unpack(current);
            if pof.end != from {
                // an earlier writer has not published yet
                spins += 1;
                spin_loop();
                continue;
            }

            pof.end = to;
            if
                self.offsets.value
                    .compare_exchange_weak(current, pof.pack(), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                break;
            }
        }
        insights::record_publish_spin(spins);
    }

    /// Spin until `start == from`, then move `start` to `to`.
    fn publish_start(&self, from: u16, to: u16) {
        let mut spins = 0u64;
        loop {
            let current = self.offsets.value.load(Ordering::Acquire);
            let mut pof = Offsets::unpack(current);
            if pof.start != from {
                spins += 1;
                spin_loop();
                continue;
            }

            pof.start = to;
            if
                self.offsets.value
                    .compare_exchange_weak(current, pof.pack(), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                break;
            }
        }
        insights::record_publish_spin(spins);
    }

    #[inline(always)]
    fn index(&self, offset: u16) -> usize {
        (offset & (self.capacity - 1)) as usize
    }
}

impl SpanOwner for MpmcPipe {
    fn publish_write(&self, sequence: u64, len: usize) {
        let from = sequence as u16;
        self.publish_end(from, from.wrapping_add(len as u16));
    }

    fn publish_read(&self, sequence: u64, len: usize) {
        let from = sequence as u16;
        self.publish_start(from, from.wrapping_add(len as u16));
    }
}

impl PipeBuffer for MpmcPipe {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.capacity as usize
    }

    fn write(&self, buf: &[u8]) -> usize {
        let Some((end_mark, io_len)) = self.reserve_write(buf.len(), false) else {
            return 0;
        };

        // SAFETY: [end_mark, end_mark + io_len) is reserved for us alone
        unsafe { wrap::copy_in(&self.storage, end_mark as u64, &buf[..io_len]) };
        insights::record_write(io_len);

        self.publish_end(end_mark, end_mark.wrapping_add(io_len as u16));
        io_len
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let Some((start_mark, io_len)) = self.reserve_read(buf.len(), false) else {
            return 0;
        };

        // SAFETY: [start_mark, start_mark + io_len) is published and reserved for us alone
        unsafe { wrap::copy_out(&self.storage, start_mark as u64, &mut buf[..io_len]) };
        insights::record_read(io_len);

        self.publish_start(start_mark, start_mark.wrapping_add(io_len as u16));
        io_len
    }

    fn write_lock(&self, len: usize) -> WriteSpan<'_> {
        match self.reserve_write(len, true) {
            Some((end_mark, io_len)) => {
                debug_assert!(!wrap::crosses_lap(end_mark as u64, io_len, (self.capacity - 1) as u64));
                let ptr = self.storage.ptr_at(self.index(end_mark));
                WriteSpan::new(self, ptr, io_len, end_mark as u64)
            }
            None => WriteSpan::empty(),
        }
    }

    fn write_commit(&self, span: WriteSpan<'_>) -> Result<()> {
        span.commit_to(self)
    }

    fn read_lock(&self, len: usize) -> ReadSpan<'_> {
        match self.reserve_read(len, true) {
            Some((start_mark, io_len)) => {
                debug_assert!(!wrap::crosses_lap(start_mark as u64, io_len, (self.capacity - 1) as u64));
                let ptr = self.storage.ptr_at(self.index(start_mark));
                ReadSpan::new(self, ptr, io_len, start_mark as u64)
            }
            None => ReadSpan::empty(),
        }
    }

    fn read_commit(&self, span: ReadSpan<'_>) -> Result<()> {
        span.commit_to(self)
    }

    fn len(&self) -> usize {
        self.offsets().readable() as usize
    }

    fn free_space(&self) -> usize {
        (self.capacity - self.offsets().reserved()) as usize
    }
}

impl fmt::Debug for MpmcPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcPipe")
            .field("capacity", &self.capacity)
            .field("storage", &self.storage.kind())
            .field("offsets", &self.offsets())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::pipe::wrap::crosses_lap;
    use std::sync::atomic::{ AtomicU64, Ordering as AtomicOrdering };
    use std::sync::{ Arc, Barrier };
    use std::thread;
    use std::time::Duration;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn test_mpmc_write_read_chunks() {
        let pipe = MpmcPipe::new(32768).unwrap();
        let buf1 = pattern(384);
        let mut buf2 = vec![0u8; 384];

        for _ in 0..172 {
            assert_eq!(pipe.write(&buf1), 384);
            buf2.fill(0);
            assert_eq!(pipe.read(&mut buf2), 384);
            assert_eq!(buf1, buf2);
        }

        let pof = pipe.offsets();
        assert!(pof.is_quiescent());
        assert_eq!(pof.start, pof.end);
        assert!(pof.is_consistent(32768));
    }

    #[test]
    fn test_mpmc_smallest_capacity_saturates() {
        let pipe = MpmcPipe::new(4).unwrap();
        assert_eq!(pipe.write(&[1, 2, 3, 4, 5, 6, 7, 8]), 4);
        assert_eq!(pipe.write(&[9]), 0);
        assert!(pipe.is_full());

        let mut out = [0u8; 8];
        assert_eq!(pipe.read(&mut out[..2]), 2);
        assert_eq!(pipe.write(&[9, 10, 11]), 2);

        assert_eq!(pipe.read(&mut out), 4);
        assert_eq!(&out[..4], &[3, 4, 9, 10]);
    }

    #[test]
    fn test_mpmc_empty_and_full_leave_offsets_untouched() {
        let pipe = MpmcPipe::new(16).unwrap();
        let before = pipe.offsets();
        let mut out = [0u8; 4];
        assert_eq!(pipe.read(&mut out), 0);
        assert!(pipe.read_lock(4).is_empty());
        assert_eq!(pipe.offsets(), before);

        assert_eq!(pipe.write(&[0xaa; 16]), 16);
        let full = pipe.offsets();
        assert_eq!(pipe.write(&[1]), 0);
        assert!(pipe.write_lock(1).is_empty());
        assert_eq!(pipe.offsets(), full);
    }

    #[test]
    fn test_mpmc_zero_length_is_noop() {
        let pipe = MpmcPipe::new(16).unwrap();
        assert_eq!(pipe.write(&[]), 0);
        assert!(pipe.write_lock(0).is_empty());
        pipe.write(b"abc");
        assert_eq!(pipe.read(&mut []), 0);
        assert!(pipe.read_lock(0).is_empty());
        assert_eq!(pipe.offsets(), Offsets { start: 0, start_mark: 0, end: 3, end_mark: 3 });
    }

    #[test]
    fn test_mpmc_copy_wraps_transparently() {
        let pipe = MpmcPipe::new(16).unwrap();
        let mut out = [0u8; 16];

        assert_eq!(pipe.write(&pattern(12)), 12);
        assert_eq!(pipe.read(&mut out[..12]), 12);

        // 12..22 crosses the physical end
        let data: Vec<u8> = (100..110).collect();
        assert_eq!(pipe.write(&data), 10);
        assert_eq!(pipe.read(&mut out[..10]), 10);
        assert_eq!(&out[..10], data.as_slice());
    }

    #[test]
    fn test_mpmc_lock_spans_never_wrap() {
        let pipe = MpmcPipe::new(16).unwrap();
        let mut out = [0u8; 16];
        pipe.write(&pattern(12));
        pipe.read(&mut out[..12]);

        let mut span = pipe.write_lock(10);
        assert_eq!(span.len(), 4);
        assert_eq!(span.sequence(), 12);
        assert!(!crosses_lap(span.sequence(), span.len(), 15));
        span.fill_from(b"wxyz");
        pipe.write_commit(span).unwrap();

        let mut span = pipe.write_lock(10);
        assert_eq!(span.len(), 10);
        assert_eq!(span.sequence(), 16);
        span.fill_from(&[7u8; 10]);
        pipe.write_commit(span).unwrap();

        let span = pipe.read_lock(16);
        assert_eq!(span.as_slice(), b"wxyz");
        pipe.read_commit(span).unwrap();

        let span = pipe.read_lock(16);
        assert_eq!(span.as_slice(), &[7u8; 10]);
        pipe.read_commit(span).unwrap();
        assert!(pipe.offsets().is_quiescent());
    }

    #[test]
    fn test_mpmc_lock_reserves_before_publish() {
        let pipe = MpmcPipe::new(64).unwrap();

        let mut span = pipe.write_lock(8);
        span.fill_from(b"reserved");
        assert_eq!(pipe.offsets(), Offsets { start: 0, start_mark: 0, end: 0, end_mark: 8 });
        assert_eq!(pipe.len(), 0);
        assert_eq!(pipe.free_space(), 56);

        pipe.write_commit(span).unwrap();
        assert_eq!(pipe.len(), 8);

        let span = pipe.read_lock(3);
        assert_eq!(pipe.offsets(), Offsets { start: 0, start_mark: 3, end: 8, end_mark: 8 });
        // bytes under an uncommitted read are not free yet
        assert_eq!(pipe.free_space(), 56);
        assert_eq!(span.as_slice(), b"res");
        pipe.read_commit(span).unwrap();
        assert_eq!(pipe.free_space(), 59);
    }

    #[test]
    fn test_mpmc_counter_wrap_past_u16() {
        let pipe = MpmcPipe::new(1024).unwrap();
        let chunk = pattern(1000);
        let mut out = vec![0u8; 1000];

        // 70 * 1000 bytes takes every offset past 65535 at least once
        for _ in 0..70 {
            assert_eq!(pipe.write(&chunk), 1000);
            assert_eq!(pipe.read(&mut out), 1000);
            assert_eq!(out, chunk);
        }
        let pof = pipe.offsets();
        assert!(pof.is_quiescent());
        assert_eq!(pof.start, (70_000u32 % 65536) as u16);
    }

    #[test]
    fn test_mpmc_fifo_publication() {
        let pipe = MpmcPipe::new(64).unwrap();
        let first_reserved = Barrier::new(2);
        let second_reserved = Barrier::new(2);

        thread::scope(|s| {
            let early = s.spawn(|| {
                let mut span = pipe.write_lock(4);
                span.fill_from(b"AAAA");
                first_reserved.wait();
                second_reserved.wait();
                // give the later writer time to reach its publish spin
                thread::sleep(Duration::from_millis(50));
                assert_eq!(pipe.len(), 0);
                pipe.write_commit(span).unwrap();
            });

            let late = s.spawn(|| {
                first_reserved.wait();
                let mut span = pipe.write_lock(4);
                assert_eq!(span.sequence(), 4);
                span.fill_from(b"BBBB");
                second_reserved.wait();
                // blocks until the earlier reservation publishes
                pipe.write_commit(span).unwrap();
            });

            early.join().unwrap();
            late.join().unwrap();
        });

        let mut out = [0u8; 8];
        assert_eq!(pipe.read(&mut out), 8);
        assert_eq!(&out, b"AAAABBBB");
    }

    #[test]
    fn test_mpmc_fifo_read_release() {
        let pipe = MpmcPipe::new(64).unwrap();
        assert_eq!(pipe.write(b"AAAABBBB"), 8);
        let first_reserved = Barrier::new(2);
        let second_reserved = Barrier::new(2);

        thread::scope(|s| {
            let early = s.spawn(|| {
                let span = pipe.read_lock(4);
                assert_eq!(span.as_slice(), b"AAAA");
                first_reserved.wait();
                second_reserved.wait();
                // the later reader is spinning, space stays held
                thread::sleep(Duration::from_millis(50));
                assert_eq!(pipe.offsets().start, 0);
                assert_eq!(pipe.free_space(), 56);
                pipe.read_commit(span).unwrap();
            });

            let late = s.spawn(|| {
                first_reserved.wait();
                let span = pipe.read_lock(4);
                assert_eq!(span.sequence(), 4);
                assert_eq!(span.as_slice(), b"BBBB");
                second_reserved.wait();
                // blocks until the earlier span releases
                pipe.read_commit(span).unwrap();
            });

            early.join().unwrap();
            late.join().unwrap();
        });

        let pof = pipe.offsets();
        assert_eq!(pof.start, 8);
        assert!(pof.is_quiescent());
        assert_eq!(pipe.free_space(), 64);
    }

    #[test]
    fn test_mpmc_dropped_span_is_published() {
        let pipe = MpmcPipe::new(16).unwrap();
        {
            let mut span = pipe.write_lock(3);
            span.fill_from(b"xyz");
        }
        assert_eq!(pipe.len(), 3);

        let mut out = [0u8; 3];
        assert_eq!(pipe.read(&mut out), 3);
        assert_eq!(&out, b"xyz");
    }

    #[test]
    fn test_mpmc_multi_writer_multi_reader_conservation() {
        let pipe = Arc::new(MpmcPipe::new(256).unwrap());
        let writers = 4u64;
        let readers = 4;
        let words_per_writer = 20_000u64;
        let total_bytes = writers * words_per_writer * 8;
        let read_total = Arc::new(AtomicU64::new(0));

        let mut producers = vec![];
        for w in 0..writers {
            let pipe = pipe.clone();
            producers.push(thread::spawn(move || {
                let bytes: Vec<u8> = (0..words_per_writer)
                    .flat_map(|i| ((w << 32) | i).to_le_bytes())
                    .collect();
                let mut sent = 0;
                while sent < bytes.len() {
                    let n = pipe.write(&bytes[sent..(sent + 64).min(bytes.len())]);
                    if n == 0 {
                        std::hint::spin_loop();
                    }
                    sent += n;
                }
                bytes.iter().fold(0u64, |acc, &b| acc.wrapping_add(b as u64))
            }));
        }

        let mut consumers = vec![];
        for _ in 0..readers {
            let pipe = pipe.clone();
            let read_total = read_total.clone();
            consumers.push(thread::spawn(move || {
                let mut sum = 0u64;
                let mut buf = [0u8; 96];
                while read_total.load(AtomicOrdering::Relaxed) < total_bytes {
                    let n = pipe.read(&mut buf);
                    if n == 0 {
                        std::hint::spin_loop();
                        continue;
                    }
                    sum = buf[..n].iter().fold(sum, |acc, &b| acc.wrapping_add(b as u64));
                    read_total.fetch_add(n as u64, AtomicOrdering::Relaxed);
                }
                sum
            }));
        }

        let write_sum = producers
            .into_iter()
            .fold(0u64, |acc, p| acc.wrapping_add(p.join().unwrap()));
        let read_sum = consumers
            .into_iter()
            .fold(0u64, |acc, c| acc.wrapping_add(c.join().unwrap()));

        assert_eq!(read_total.load(AtomicOrdering::Relaxed), total_bytes);
        assert_eq!(write_sum, read_sum, "Sum mismatch - data loss detected!");
        assert!(pipe.offsets().is_quiescent());
        assert!(pipe.is_empty());
    }
}
