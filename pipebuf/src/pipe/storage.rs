//! Backing store for pipe buffers.
//!
//! ## Allocation Strategies
//!
//! - `StorageKind::Heap` - Standard heap allocation
//! - `StorageKind::Mapped` - Memory-mapped with mlock (no page faults on the hot path)
//!
//! The region is allocated once, zero filled, and never resized. All access
//! goes through raw pointers because disjoint byte ranges are written by
//! different reservation holders through a shared `&self`.

use std::ptr::{self, NonNull};

use crate::error::{PipeError, Result};

/// Where the backing bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    Heap,
    Mapped,
}

impl StorageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::Heap => "heap",
            StorageKind::Mapped => "mapped",
        }
    }
}

pub(crate) struct Storage {
    ptr: NonNull<u8>,
    len: usize,
    kind: StorageKind,
}

impl Storage {
    pub fn allocate(len: usize, kind: StorageKind) -> Result<Self> {
        match kind {
            StorageKind::Heap => Ok(Self::heap(len)),
            StorageKind::Mapped => Self::mapped(len),
        }
    }

    fn heap(len: usize) -> Self {
        let boxed: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        Self {
            // SAFETY: Box::into_raw never returns null
            ptr: unsafe { NonNull::new_unchecked(raw) },
            len,
            kind: StorageKind::Heap,
        }
    }

    #[cfg(unix)]
    fn mapped(len: usize) -> Result<Self> {
        let ptr = unsafe {
            let p = libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0
            );

            if p == libc::MAP_FAILED {
                return Err(std::io::Error::last_os_error().into());
            }

            // Lock memory to prevent swapping; RLIMIT_MEMLOCK may refuse
            let _ = libc::mlock(p, len);

            ptr::write_bytes(p as *mut u8, 0, len);

            p as *mut u8
        };

        Ok(Self {
            ptr: NonNull::new(ptr).ok_or_else(|| PipeError::config("mmap returned null"))?,
            len,
            kind: StorageKind::Mapped,
        })
    }

    #[cfg(not(unix))]
    fn mapped(_len: usize) -> Result<Self> {
        Err(PipeError::config("mapped storage requires a unix target"))
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Pointer to physical byte `index`.
    #[inline(always)]
    pub fn ptr_at(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.len);
        // SAFETY: index is within the allocation
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(index)) }
    }

    /// # Safety
    /// `[index, index + src.len())` must lie inside the region and be
    /// reserved exclusively by the caller.
    #[inline(always)]
    pub unsafe fn copy_in(&self, index: usize, src: &[u8]) {
        debug_assert!(index + src.len() <= self.len);
        ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(index), src.len());
    }

    /// # Safety
    /// `[index, index + dst.len())` must lie inside the region and hold
    /// published bytes reserved by the caller.
    #[inline(always)]
    pub unsafe fn copy_out(&self, index: usize, dst: &mut [u8]) {
        debug_assert!(index + dst.len() <= self.len);
        ptr::copy_nonoverlapping(self.ptr.as_ptr().add(index), dst.as_mut_ptr(), dst.len());
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        match self.kind {
            StorageKind::Heap => unsafe {
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len)));
            },
            #[cfg(unix)]
            StorageKind::Mapped => unsafe {
                libc::munlock(self.ptr.as_ptr() as *const libc::c_void, self.len);
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
            },
            #[cfg(not(unix))]
            StorageKind::Mapped => {}
        }
    }
}

unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}
