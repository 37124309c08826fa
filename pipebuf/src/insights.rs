//! Insights - Observability for pipebuf.
//!
//! Tracing hooks on the copy and publish paths. Zero-cost when disabled.
//!
//! # Usage
//!
//! ## Basic tracing (console output)
//! ```toml
//! pipebuf = { version = "0.1", features = ["tracing"] }
//! ```
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Tracy profiler (real-time visualization)
//! ```toml
//! pipebuf = { version = "0.1", features = ["tracy"] }
//! ```
//! ```rust,ignore
//! pipebuf::init_tracy();
//! ```
//! Then run Tracy profiler: https://github.com/wolfpld/tracy

/// Initialize Tracy profiler (call once at startup)
#[cfg(feature = "tracy")]
pub fn init_tracy() {
    use tracing_subscriber::layer::SubscriberExt;
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(tracing_tracy::TracyLayer::default()),
    )
    .expect("setup tracy layer");
}

#[cfg(not(feature = "tracy"))]
pub fn init_tracy() {}

/// Record a copy into the buffer
#[cfg(feature = "tracing")]
#[inline]
pub fn record_write(bytes: usize) {
    let _span = tracing::trace_span!("write", bytes).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_write(_bytes: usize) {}

/// Record a copy out of the buffer
#[cfg(feature = "tracing")]
#[inline]
pub fn record_read(bytes: usize) {
    let _span = tracing::trace_span!("read", bytes).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_read(_bytes: usize) {}

/// Record backpressure (no free space for a write)
#[cfg(feature = "tracing")]
#[inline]
pub fn record_backpressure() {
    let _span = tracing::warn_span!("backpressure").entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_backpressure() {}

/// Record a read that found nothing published
#[cfg(feature = "tracing")]
#[inline]
pub fn record_starved() {
    let _span = tracing::debug_span!("starved").entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_starved() {}

/// Record a publish that waited on earlier reservations
#[cfg(feature = "tracing")]
#[inline]
pub fn record_publish_spin(spins: u64) {
    if spins > 0 {
        tracing::trace!(spins, "publish waited on earlier reservation");
    }
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_publish_spin(_spins: u64) {}

/// Log buffer construction
#[cfg(feature = "tracing")]
pub fn record_created(kind: &str, capacity: usize, storage: &str) {
    tracing::debug!(kind, capacity, storage, "pipe buffer created");
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_created(_kind: &str, _capacity: usize, _storage: &str) {}
