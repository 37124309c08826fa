//! Wrap-around arithmetic shared by every variant.
//!
//! Offsets are logical (they keep counting across laps); the physical index
//! is `offset & mask`. A reservation `[a, b)` whose first and last byte sit in
//! different laps is split at the end of the array into two runs. Copying
//! operations split transparently, lock operations shrink to the first run.

use super::storage::Storage;

/// True when `[start, start + len)` crosses the physical end of the array.
#[inline(always)]
pub(crate) fn crosses_lap(start: u64, len: usize, mask: u64) -> bool {
    len > 0 && (start & !mask) != (start.wrapping_add(len as u64 - 1) & !mask)
}

/// Lengths of the run before the physical end and the run wrapped to 0.
#[inline(always)]
pub(crate) fn split(index: usize, len: usize, capacity: usize) -> (usize, usize) {
    let first = len.min(capacity - index);
    (first, len - first)
}

/// Largest prefix of `len` that stays contiguous from `offset`.
#[inline(always)]
pub(crate) fn contiguous_len(offset: u64, len: usize, capacity: usize) -> usize {
    let index = (offset as usize) & (capacity - 1);
    len.min(capacity - index)
}

/// Copy `src` into the array starting at logical `offset`.
///
/// # Safety
/// `[offset, offset + src.len())` must be reserved for writing by the caller.
#[inline]
pub(crate) unsafe fn copy_in(storage: &Storage, offset: u64, src: &[u8]) {
    let capacity = storage.len();
    let index = (offset as usize) & (capacity - 1);
    let (first, rest) = split(index, src.len(), capacity);
    storage.copy_in(index, &src[..first]);
    if rest > 0 {
        storage.copy_in(0, &src[first..]);
    }
}

/// Copy from the array starting at logical `offset` into `dst`.
///
/// # Safety
/// `[offset, offset + dst.len())` must be published and reserved for reading
/// by the caller.
#[inline]
pub(crate) unsafe fn copy_out(storage: &Storage, offset: u64, dst: &mut [u8]) {
    let capacity = storage.len();
    let index = (offset as usize) & (capacity - 1);
    let (first, rest) = split(index, dst.len(), capacity);
    storage.copy_out(index, &mut dst[..first]);
    if rest > 0 {
        storage.copy_out(0, &mut dst[first..]);
    }
}
