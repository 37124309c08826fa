//! # pipebuf-test-support
//!
//! Testing infrastructure for pipebuf.
//!
//! ## Components
//!
//! - **StressRunner** - N writer + N reader threads over any `PipeBuffer`,
//!   checksummed and timed
//! - **StreamDigest** - Order-sensitive CRC32 of a byte stream

pub mod stress;
pub mod verify;

pub use stress::{ AccessMode, StressConfig, StressCounters, StressReport, StressRunner };
pub use verify::StreamDigest;
