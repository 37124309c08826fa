use crate::sync::atomic::AtomicU64;

/// Cache-line padded cursor to prevent false sharing.
///
/// The SPSC writer stores `end` on every write and the reader stores `start`
/// on every read. Keeping the two counters on separate cache lines stops each
/// side from invalidating the line the other side is spinning on.
#[repr(align(128))]
pub(crate) struct PaddedCursor {
    pub value: AtomicU64,
}

impl PaddedCursor {
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }
}
