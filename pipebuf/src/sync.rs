//! Switches atomics between `std` and `loom` so the cursor protocol can be
//! model checked with `RUSTFLAGS="--cfg loom"`.

#[cfg(not(loom))]
pub(crate) mod atomic {
    pub use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
}

#[cfg(loom)]
pub(crate) mod atomic {
    pub use loom::sync::atomic::{AtomicBool, AtomicU64, Ordering};
}

/// Busy-wait hint. Under loom this yields so the model can schedule the
/// thread we are waiting on.
#[cfg(not(loom))]
#[inline(always)]
pub(crate) fn spin_loop() {
    std::hint::spin_loop();
}

#[cfg(loom)]
#[inline(always)]
pub(crate) fn spin_loop() {
    loom::thread::yield_now();
}
