//! pipebuf constants
//!
//! Core constants used by the pipe buffer implementations.

/// Default pipe capacity in bytes (must be power of 2)
pub const DEFAULT_CAPACITY: usize = 4096;

/// Exclusive upper bound on MPMC capacity. Offsets are 16-bit and the
/// unsigned wrap-around arithmetic is only reversible within one lap.
pub const MPMC_MAX_CAPACITY: usize = 1 << 16;

/// Alignment used to keep independently written cursors apart
pub const CACHE_LINE: usize = 128;
