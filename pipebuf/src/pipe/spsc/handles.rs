//! Owned writer/reader ends of an [`SpscPipe`].
//!
//! Neither handle is `Clone` and every operation takes `&mut self`, so one
//! thread per side and one outstanding span per side hold at compile time.
//! A span borrows its handle; commit it with [`WriteSpan::commit`] /
//! [`ReadSpan::commit`].

use std::sync::Arc;

use crate::pipe::span::{ ReadSpan, WriteSpan };
use crate::pipe::spsc::SpscPipe;
use crate::pipe::PipeBuffer;

/// Writer end.
#[derive(Debug)]
pub struct SpscWriter {
    pipe: Arc<SpscPipe>,
}

impl SpscWriter {
    pub(crate) fn new(pipe: Arc<SpscPipe>) -> Self {
        Self { pipe }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.pipe.capacity()
    }

    #[inline(always)]
    pub fn free_space(&self) -> usize {
        self.pipe.free_space()
    }

    /// Copy in as much of `buf` as fits.
    #[inline(always)]
    pub fn write(&mut self, buf: &[u8]) -> usize {
        self.pipe.write(buf)
    }

    /// Reserve up to `len` contiguous bytes.
    #[inline(always)]
    pub fn write_lock(&mut self, len: usize) -> WriteSpan<'_> {
        self.pipe.write_lock(len)
    }
}

/// Reader end.
#[derive(Debug)]
pub struct SpscReader {
    pipe: Arc<SpscPipe>,
}

impl SpscReader {
    pub(crate) fn new(pipe: Arc<SpscPipe>) -> Self {
        Self { pipe }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.pipe.capacity()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.pipe.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.pipe.is_empty()
    }

    #[inline(always)]
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.pipe.read(buf)
    }

    /// Borrow up to `len` contiguous published bytes.
    #[inline(always)]
    pub fn read_lock(&mut self, len: usize) -> ReadSpan<'_> {
        self.pipe.read_lock(len)
    }
}
