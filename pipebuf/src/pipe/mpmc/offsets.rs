//! The MPMC control word: four 16-bit offsets packed into one `u64`.
//!
//! ```text
//!                  start                   end
//!                  |       start_mark      |       end_mark
//!  ________________--------XXXXXXXXXXXXXXXX++++++++________________
//!
//!  ---- being copied out by readers   XXXX published, readable
//!  ++++ being copied in by writers    ____ free
//! ```
//!
//! Invariant (mod 2^16): `start <= start_mark <= end <= end_mark <= start + capacity`.

const FIELD_MASK: u64 = (1 << 16) - 1;

/// Snapshot of the MPMC offset quadruple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offsets {
    pub start: u16,
    pub start_mark: u16,
    pub end: u16,
    pub end_mark: u16,
}

impl Offsets {
    #[inline(always)]
    pub const fn pack(self) -> u64 {
        ((self.start as u64) & FIELD_MASK)
            | (((self.start_mark as u64) & FIELD_MASK) << 16)
            | (((self.end as u64) & FIELD_MASK) << 32)
            | (((self.end_mark as u64) & FIELD_MASK) << 48)
    }

    #[inline(always)]
    pub const fn unpack(word: u64) -> Self {
        Self {
            start: (word & FIELD_MASK) as u16,
            start_mark: ((word >> 16) & FIELD_MASK) as u16,
            end: ((word >> 32) & FIELD_MASK) as u16,
            end_mark: ((word >> 48) & FIELD_MASK) as u16,
        }
    }

    /// Bytes between `start` and `end`: published plus in-flight reads.
    #[inline(always)]
    pub fn occupied(&self) -> u16 {
        self.end.wrapping_sub(self.start)
    }

    /// Bytes a writer cannot claim: everything from `start` to `end_mark`.
    #[inline(always)]
    pub fn reserved(&self) -> u16 {
        self.end_mark.wrapping_sub(self.start)
    }

    /// Published bytes no reader has claimed yet.
    #[inline(always)]
    pub fn readable(&self) -> u16 {
        self.end.wrapping_sub(self.start_mark)
    }

    /// Checks the ordering invariant for a buffer of `capacity` bytes.
    pub fn is_consistent(&self, capacity: usize) -> bool {
        let reading = self.start_mark.wrapping_sub(self.start) as usize;
        let occupied = self.occupied() as usize;
        let reserved = self.reserved() as usize;
        reading <= occupied && occupied <= reserved && reserved <= capacity
    }

    /// No reservation on either side is outstanding.
    pub fn is_quiescent(&self) -> bool {
        self.start == self.start_mark && self.end == self.end_mark
    }
}
