//! Reserved regions handed out by `write_lock` / `read_lock`.
//!
//! A span borrows the buffer it came from and is consumed by commit, so a
//! span cannot outlive its buffer and cannot be committed twice. Dropping a
//! non-empty span without committing publishes it (same as the read guards
//! that commit on drop): strict-order publication would otherwise stall every
//! later reservation on the same side.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::{PipeError, Result};

/// Publication hooks implemented by every buffer variant.
pub(crate) trait SpanOwner: Send + Sync {
    fn publish_write(&self, sequence: u64, len: usize);
    fn publish_read(&self, sequence: u64, len: usize);
}

#[inline(always)]
fn same_owner(a: &dyn SpanOwner, b: &dyn SpanOwner) -> bool {
    std::ptr::eq(
        a as *const dyn SpanOwner as *const (),
        b as *const dyn SpanOwner as *const (),
    )
}

/// Region reserved for writing. Visible to readers once committed.
pub struct WriteSpan<'a> {
    owner: Option<&'a dyn SpanOwner>,
    ptr: NonNull<u8>,
    len: usize,
    sequence: u64,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> WriteSpan<'a> {
    pub(crate) fn new(owner: &'a dyn SpanOwner, ptr: NonNull<u8>, len: usize, sequence: u64) -> Self {
        Self {
            owner: Some(owner),
            ptr,
            len,
            sequence,
            _marker: PhantomData,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            owner: None,
            ptr: NonNull::dangling(),
            len: 0,
            sequence: 0,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical offset at which this reservation starts.
    #[inline(always)]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the range was reserved for this span alone and stays
        // allocated for 'a
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `src` into the front of the span, returning the bytes copied.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.len);
        self.as_mut_slice()[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Publish to the buffer the span was reserved from.
    pub fn commit(mut self) -> Result<()> {
        if let Some(owner) = self.owner.take() {
            owner.publish_write(self.sequence, self.len);
        }
        Ok(())
    }

    pub(crate) fn commit_to(self, owner: &dyn SpanOwner) -> Result<()> {
        match self.owner {
            None => Ok(()),
            Some(own) if same_owner(own, owner) => self.commit(),
            Some(_) => Err(PipeError::ForeignSpan),
        }
    }
}

impl Drop for WriteSpan<'_> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.publish_write(self.sequence, self.len);
        }
    }
}

// SAFETY: the owner is Sync and the byte range belongs to this span alone
unsafe impl Send for WriteSpan<'_> {}

impl fmt::Debug for WriteSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSpan")
            .field("len", &self.len)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Region reserved for reading. Released back to writers once committed.
pub struct ReadSpan<'a> {
    owner: Option<&'a dyn SpanOwner>,
    ptr: NonNull<u8>,
    len: usize,
    sequence: u64,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> ReadSpan<'a> {
    pub(crate) fn new(owner: &'a dyn SpanOwner, ptr: NonNull<u8>, len: usize, sequence: u64) -> Self {
        Self {
            owner: Some(owner),
            ptr,
            len,
            sequence,
            _marker: PhantomData,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            owner: None,
            ptr: NonNull::dangling(),
            len: 0,
            sequence: 0,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical offset at which this reservation starts.
    #[inline(always)]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the range is published and reserved for this span alone
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Release the bytes to writers.
    pub fn commit(mut self) -> Result<()> {
        if let Some(owner) = self.owner.take() {
            owner.publish_read(self.sequence, self.len);
        }
        Ok(())
    }

    pub(crate) fn commit_to(self, owner: &dyn SpanOwner) -> Result<()> {
        match self.owner {
            None => Ok(()),
            Some(own) if same_owner(own, owner) => self.commit(),
            Some(_) => Err(PipeError::ForeignSpan),
        }
    }
}

impl Drop for ReadSpan<'_> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.publish_read(self.sequence, self.len);
        }
    }
}

// SAFETY: the owner is Sync and the byte range belongs to this span alone
unsafe impl Send for ReadSpan<'_> {}

impl fmt::Debug for ReadSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSpan")
            .field("len", &self.len)
            .field("sequence", &self.sequence)
            .finish()
    }
}
