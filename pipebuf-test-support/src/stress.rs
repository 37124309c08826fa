//! Multi-threaded stress driver for pipe buffers.
//!
//! Each writer generates a word stream with a small LCG, sums it and pushes
//! it through the pipe; each reader drains the same number of words and sums
//! what it got. Sums are order-independent, so they must agree for any
//! number of writers and readers. With one of each the byte stream is also
//! digested on both sides, which checks order.
//!
//! Every request is a whole number of 32-bit words and capacities are powers
//! of two of at least 4, so reservations never split a word.

use std::fmt;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use pipebuf::{ open, PipeBuffer, PipeConfig, PipeError, PipeKind, Result, StorageKind };
use rand::rngs::StdRng;
use rand::{ Rng, SeedableRng };

use crate::verify::StreamDigest;

const WORD: usize = std::mem::size_of::<u32>();

/// How threads move bytes through the pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// `write` / `read`, generating `capacity` words ahead of the cursor
    Copy,
    /// `write` / `read`, generating `capacity / 4` words ahead of the cursor
    WordChunked,
    /// `write_lock` + commit / `read_lock` + commit
    LockCommit,
}

/// Configuration for stress tests
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub kind: PipeKind,
    /// Pipe capacity in bytes
    pub capacity: usize,
    pub storage: StorageKind,
    /// Writer threads; the same number of readers is spawned
    pub threads: usize,
    /// Words per pass, per writer
    pub words: usize,
    /// Passes over the word stream
    pub loops: usize,
    pub mode: AccessMode,
    /// Ask for a random number of words per call instead of all remaining
    pub random_requests: Option<u64>,
    /// Print progress every interval
    pub report_interval: Option<Duration>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            kind: PipeKind::Mpmc,
            capacity: 4096,
            storage: StorageKind::Heap,
            threads: 1,
            words: (1 << 17) - 11,
            loops: 64,
            mode: AccessMode::Copy,
            random_requests: None,
            report_interval: None,
        }
    }
}

impl StressConfig {
    pub fn new(kind: PipeKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn with_words(mut self, words: usize) -> Self {
        self.words = words;
        self
    }

    pub fn with_loops(mut self, loops: usize) -> Self {
        self.loops = loops;
        self
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Randomize request sizes with the given seed.
    pub fn with_random_requests(mut self, seed: u64) -> Self {
        self.random_requests = Some(seed);
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.words == 0 || self.loops == 0 {
            return Err(PipeError::config("threads, words and loops must be non-zero"));
        }
        if self.capacity < WORD {
            return Err(PipeError::capacity(self.capacity, "stress runs need room for one word"));
        }
        if self.kind == PipeKind::Spsc && self.threads != 1 {
            return Err(PipeError::config("spsc pipes take one writer and one reader"));
        }
        Ok(())
    }

    /// Words generated ahead of the write cursor
    fn lookahead(&self) -> usize {
        match self.mode {
            AccessMode::WordChunked => (self.capacity / WORD).max(1),
            AccessMode::Copy | AccessMode::LockCommit => self.capacity,
        }
    }
}

/// Shared progress counters, in words
#[derive(Debug, Default)]
pub struct StressCounters {
    pub written: AtomicU64,
    pub read: AtomicU64,
    pub running: AtomicBool,
}

impl StressCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            ..Default::default()
        })
    }

    pub fn record_write(&self, words: usize) {
        self.written.fetch_add(words as u64, Ordering::Relaxed);
    }

    pub fn record_read(&self, words: usize) {
        self.read.fetch_add(words as u64, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// One side of one thread
#[derive(Debug, Clone)]
struct SideResult {
    sum: u64,
    ops: u64,
    errs: u64,
    digest: u32,
    started: Instant,
    finished: Instant,
}

/// Aggregated outcome of a stress run
#[derive(Debug, Clone)]
pub struct StressReport {
    pub kind: PipeKind,
    pub capacity: usize,
    /// Words per pass, summed over writers
    pub words: usize,
    pub loops: usize,
    pub wsum: u64,
    pub rsum: u64,
    pub wops: u64,
    pub rops: u64,
    /// Calls that moved nothing
    pub werrs: u64,
    pub rerrs: u64,
    pub write_time: Duration,
    pub read_time: Duration,
    /// Writer and reader stream digests, single writer/reader runs only
    pub digests: Option<(u32, u32)>,
}

impl StressReport {
    pub fn sums_match(&self) -> bool {
        self.wsum == self.rsum
    }

    /// Byte order was preserved. `None` when order is undefined (many threads).
    pub fn order_preserved(&self) -> Option<bool> {
        self.digests.map(|(w, r)| w == r)
    }

    pub fn total_bytes(&self) -> u64 {
        (self.words * self.loops * WORD) as u64
    }

    fn ns_per_op(time: Duration, ops: u64) -> f64 {
        if ops == 0 {
            0.0
        } else {
            (time.as_nanos() as f64) / (ops as f64)
        }
    }

    fn mb_per_sec(&self, time: Duration) -> f64 {
        let secs = time.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes() as f64) / secs / (1024.0 * 1024.0)
        } else {
            0.0
        }
    }

    fn write_row(
        &self,
        f: &mut fmt::Formatter<'_>,
        label: &str,
        ops: u64,
        errs: u64,
        time: Duration
    ) -> fmt::Result {
        let ns = Self::ns_per_op(time, ops);
        let per_sec = if ns > 0.0 { (1e9 / ns) as u64 } else { 0 };
        writeln!(
            f,
            "{:>10} {:>10} {:>13} {:>10.2}ns {:>10} {:>10.2}",
            label,
            ops,
            errs,
            ns,
            per_sec,
            self.mb_per_sec(time)
        )
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "wsum:{:016x} ({:6.2} sec) rsum:{:016x} ({:6.2} sec)",
            self.wsum,
            self.write_time.as_secs_f64(),
            self.rsum,
            self.read_time.as_secs_f64()
        )?;
        writeln!(f)?;
        let name = format!("{}-byte", self.capacity);
        writeln!(
            f,
            "{:>10} {:>10} {:>13} {:>12} {:>10} {:>10}",
            name,
            "ops",
            "errors",
            "time",
            "msg/sec",
            "MB/sec"
        )?;
        writeln!(
            f,
            "{:>10} {:>10} {:>13} {:>12} {:>10} {:>10}",
            "",
            "----------",
            "-------------",
            "------------",
            "----------",
            "----------"
        )?;
        self.write_row(f, "write", self.wops, self.werrs, self.write_time)?;
        self.write_row(f, "read", self.rops, self.rerrs, self.read_time)
    }
}

/// Runner for stress tests with optional progress reporting
pub struct StressRunner {
    config: StressConfig,
    counters: Arc<StressCounters>,
}

impl StressRunner {
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            counters: StressCounters::new(),
        }
    }

    pub fn counters(&self) -> Arc<StressCounters> {
        self.counters.clone()
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Open a fresh pipe from the config and run against it.
    pub fn run(&self) -> Result<StressReport> {
        self.config.validate()?;
        let pipe = open(
            self.config.kind,
            PipeConfig::new(self.config.capacity)?.with_storage(self.config.storage)
        )?;
        self.run_on(pipe)
    }

    /// Run against an existing pipe. Single-writer pipes must only see
    /// `threads == 1`.
    pub fn run_on(&self, pipe: Arc<dyn PipeBuffer>) -> Result<StressReport> {
        self.config.validate()?;
        let config = &self.config;
        self.counters.running.store(true, Ordering::Relaxed);

        let reporter = config.report_interval.map(|interval| {
            let counters = self.counters.clone();
            let total = (config.words * config.loops * config.threads) as u64;
            thread::spawn(move || report_progress(&counters, interval, total))
        });

        let (writes, reads) = thread::scope(|scope| {
            let mut writers = Vec::with_capacity(config.threads);
            let mut readers = Vec::with_capacity(config.threads);

            for id in 0..config.threads {
                let (rpipe, rcounters) = (pipe.clone(), self.counters.clone());
                readers.push(
                    scope.spawn(move || {
                        read_side(&*rpipe, config, id, &rcounters).inspect_err(|_| rcounters.stop())
                    })
                );

                let (wpipe, wcounters) = (pipe.clone(), self.counters.clone());
                writers.push(
                    scope.spawn(move || {
                        write_side(&*wpipe, config, id, &wcounters).inspect_err(|_| wcounters.stop())
                    })
                );
            }

            let writes = writers
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<Result<Vec<SideResult>>>();
            let reads = readers
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<Result<Vec<SideResult>>>();
            (writes, reads)
        });

        self.counters.stop();
        if let Some(reporter) = reporter {
            let _ = reporter.join();
        }

        Ok(self.aggregate(&writes?, &reads?))
    }

    fn aggregate(&self, writes: &[SideResult], reads: &[SideResult]) -> StressReport {
        let config = &self.config;
        let span = |sides: &[SideResult]| -> Duration {
            let start = sides.iter().map(|s| s.started).min();
            let end = sides.iter().map(|s| s.finished).max();
            match (start, end) {
                (Some(start), Some(end)) => end.duration_since(start),
                _ => Duration::ZERO,
            }
        };

        let digests = if config.threads == 1 {
            Some((writes[0].digest, reads[0].digest))
        } else {
            None
        };

        StressReport {
            kind: config.kind,
            capacity: config.capacity,
            words: config.words * config.threads,
            loops: config.loops,
            wsum: writes.iter().fold(0u64, |acc, s| acc.wrapping_add(s.sum)),
            rsum: reads.iter().fold(0u64, |acc, s| acc.wrapping_add(s.sum)),
            wops: writes.iter().map(|s| s.ops).sum(),
            rops: reads.iter().map(|s| s.ops).sum(),
            werrs: writes.iter().map(|s| s.errs).sum(),
            rerrs: reads.iter().map(|s| s.errs).sum(),
            write_time: span(writes),
            read_time: span(reads),
            digests,
        }
    }
}

/// Next LCG word for position `l`.
#[inline(always)]
pub fn next_word(seq: u32, l: usize) -> u32 {
    seq.wrapping_mul(793517).wrapping_add(l as u32)
}

/// Words to ask for: everything left, or a random slice of it.
fn request_words(rng: &mut Option<StdRng>, remaining: usize) -> usize {
    match rng {
        Some(rng) => rng.gen_range(1..=remaining),
        None => remaining,
    }
}

fn side_rng(config: &StressConfig, id: usize, salt: u64) -> Option<StdRng> {
    config.random_requests.map(|seed| StdRng::seed_from_u64(seed ^ ((id as u64) << 8) ^ salt))
}

fn write_side(
    pipe: &dyn PipeBuffer,
    config: &StressConfig,
    id: usize,
    counters: &StressCounters
) -> Result<SideResult> {
    let count = config.words;
    let lookahead = config.lookahead();
    let mut arr = vec![0u32; count];
    let mut rng = side_rng(config, id, 0x5752);
    let mut digest = StreamDigest::new();
    let (mut sum, mut ops, mut errs) = (0u64, 0u64, 0u64);

    let started = Instant::now();
    for _ in 0..config.loops {
        let mut seq = 0u32;
        let (mut i, mut l) = (0usize, 0usize);
        while i < count {
            while l < count && l < i + lookahead {
                seq = next_word(seq, l);
                arr[l] = seq;
                sum = sum.wrapping_add(seq as u64);
                l += 1;
            }

            let want = request_words(&mut rng, count - i);
            let src: &[u8] = bytemuck::cast_slice(&arr[i..i + want]);
            let moved = match config.mode {
                AccessMode::Copy | AccessMode::WordChunked => pipe.write(src),
                AccessMode::LockCommit => {
                    let mut span = pipe.write_lock(src.len());
                    let n = span.fill_from(src);
                    // fill_from covers the whole span since src is never shorter
                    debug_assert_eq!(n, span.len());
                    span.commit()?;
                    n
                }
            };

            debug_assert_eq!(moved % WORD, 0, "reservation split a word");
            if moved > 0 {
                digest.update(&src[..moved]);
                ops += 1;
            } else if counters.is_running() {
                errs += 1;
                thread::yield_now();
            } else {
                return Err(PipeError::config("stress run aborted by a failed peer"));
            }
            i += moved / WORD;
            counters.record_write(moved / WORD);
        }
    }

    Ok(SideResult { sum, ops, errs, digest: digest.finalize(), started, finished: Instant::now() })
}

fn read_side(
    pipe: &dyn PipeBuffer,
    config: &StressConfig,
    id: usize,
    counters: &StressCounters
) -> Result<SideResult> {
    let count = config.words;
    let mut arr = vec![0u32; count];
    let mut rng = side_rng(config, id, 0x5244);
    let mut digest = StreamDigest::new();
    let (mut sum, mut ops, mut errs) = (0u64, 0u64, 0u64);

    let started = Instant::now();
    for _ in 0..config.loops {
        let mut i = 0usize;
        while i < count {
            let want = request_words(&mut rng, count - i);
            let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut arr[i..i + want]);
            let moved = match config.mode {
                AccessMode::Copy | AccessMode::WordChunked => pipe.read(dst),
                AccessMode::LockCommit => {
                    let span = pipe.read_lock(dst.len());
                    let n = span.len();
                    dst[..n].copy_from_slice(span.as_slice());
                    span.commit()?;
                    n
                }
            };

            debug_assert_eq!(moved % WORD, 0, "reservation split a word");
            if moved > 0 {
                digest.update(&dst[..moved]);
                ops += 1;
            } else if counters.is_running() {
                errs += 1;
                thread::yield_now();
            } else {
                return Err(PipeError::config("stress run aborted by a failed peer"));
            }
            i += moved / WORD;
            counters.record_read(moved / WORD);
        }

        sum = arr.iter().fold(sum, |acc, w| acc.wrapping_add(*w as u64));
    }

    Ok(SideResult { sum, ops, errs, digest: digest.finalize(), started, finished: Instant::now() })
}

fn report_progress(counters: &StressCounters, interval: Duration, total: u64) {
    let start = Instant::now();
    while counters.is_running() {
        thread::sleep(interval);
        let written = counters.written.load(Ordering::Relaxed);
        let read = counters.read.load(Ordering::Relaxed);
        eprintln!(
            "[{:>5.1}s] written: {:>10} read: {:>10} of {} words",
            start.elapsed().as_secs_f64(),
            written,
            read,
            total
        );
    }
}
