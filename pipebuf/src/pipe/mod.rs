//! Lock-free circular byte pipes.
//!
//! - `SpscPipe` - One writer thread, one reader thread, no CAS
//! - `MpmcPipe` - Any number of writers and readers, packed 16-bit offsets
//!
//! Both implement [`PipeBuffer`], so callers can be written once against the
//! trait and bound to either variant, generically or as `dyn PipeBuffer`.

pub mod common;
pub mod mpmc;
pub mod span;
pub mod spsc;
pub mod storage;
pub mod wrap;

use std::sync::Arc;

pub use mpmc::{ MpmcPipe, Offsets };
pub use span::{ ReadSpan, WriteSpan };
pub use spsc::{ SpscPipe, SpscReader, SpscWriter };
pub use storage::StorageKind;

use crate::constants::{ DEFAULT_CAPACITY, MPMC_MAX_CAPACITY };
use crate::error::{ PipeError, Result };

/// Logical cursor position
pub type Sequence = u64;

/// Operations every pipe variant provides.
///
/// Copying calls move up to `buf.len()` bytes and return how many moved;
/// zero means full (write) or empty (read). Nothing blocks.
///
/// Lock calls reserve a contiguous span of at most `len` bytes that never
/// wraps the end of the backing array, so they may return less than is
/// available. The span becomes visible to the other side only when it is
/// committed, and commits on one side become visible in reservation order.
pub trait PipeBuffer: Send + Sync {
    /// Configured capacity in bytes.
    fn capacity(&self) -> usize;

    fn write(&self, buf: &[u8]) -> usize;

    fn read(&self, buf: &mut [u8]) -> usize;

    fn write_lock(&self, len: usize) -> WriteSpan<'_>;

    /// Publish a span from `write_lock`. A span from another buffer is
    /// rejected with `ForeignSpan` and published to its own buffer on drop.
    fn write_commit(&self, span: WriteSpan<'_>) -> Result<()>;

    fn read_lock(&self, len: usize) -> ReadSpan<'_>;

    /// Release a span from `read_lock`. Same foreign-span rule as
    /// `write_commit`.
    fn read_commit(&self, span: ReadSpan<'_>) -> Result<()>;

    /// Published bytes not yet consumed. A snapshot under concurrency.
    fn len(&self) -> usize;

    /// Bytes a writer could reserve right now. A snapshot under concurrency.
    fn free_space(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.free_space() == 0
    }
}

/// Variant selection for [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeKind {
    Spsc,
    Mpmc,
}

impl PipeKind {
    pub fn name(&self) -> &'static str {
        match self {
            PipeKind::Spsc => "spsc",
            PipeKind::Mpmc => "mpmc",
        }
    }
}

/// Configuration for pipe construction
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Capacity in bytes (must be power of 2)
    pub capacity: usize,
    /// Backing store allocation strategy
    pub storage: StorageKind,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            storage: StorageKind::Heap,
        }
    }
}

impl PipeConfig {
    /// Create a new configuration with the specified capacity
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipeError::capacity(capacity, "must be greater than 0"));
        }
        if !capacity.is_power_of_two() {
            return Err(PipeError::capacity(capacity, "must be a power of 2"));
        }

        Ok(Self {
            capacity,
            ..Default::default()
        })
    }

    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Check the configuration against a variant's limits.
    pub fn validate(&self, kind: PipeKind) -> Result<()> {
        Self::new(self.capacity)?;
        if kind == PipeKind::Mpmc && self.capacity >= MPMC_MAX_CAPACITY {
            return Err(PipeError::capacity(self.capacity, "must be below 65536 for mpmc"));
        }
        Ok(())
    }
}

/// Construct a pipe of the given kind behind the [`PipeBuffer`] trait.
pub fn open(kind: PipeKind, config: PipeConfig) -> Result<Arc<dyn PipeBuffer>> {
    Ok(match kind {
        PipeKind::Spsc => Arc::new(SpscPipe::with_config(config)?),
        PipeKind::Mpmc => Arc::new(MpmcPipe::with_config(config)?),
    })
}
