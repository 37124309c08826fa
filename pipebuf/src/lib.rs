//! pipebuf - lock-free circular byte pipes.
//!
//! A fixed-capacity byte buffer that any number of writer threads fill and
//! any number of reader threads drain without locks. Two variants share the
//! [`PipeBuffer`] interface:
//!
//! - [`SpscPipe`] - one writer, one reader, plain load/store cursors
//! - [`MpmcPipe`] - many writers, many readers, one packed atomic word
//!
//! Each side can either copy (`write` / `read`) or reserve a contiguous span
//! in place (`write_lock` / `read_lock`) and publish it later (`commit`).
//!
//! ```rust
//! use pipebuf::{ PipeBuffer, MpmcPipe };
//!
//! let pipe = MpmcPipe::new(1024).unwrap();
//! assert_eq!(pipe.write(b"hello"), 5);
//!
//! let span = pipe.read_lock(16);
//! assert_eq!(span.as_slice(), b"hello");
//! span.commit().unwrap();
//! assert!(pipe.is_empty());
//! ```

pub mod constants;
pub mod error;
pub mod insights;
pub mod pipe;

mod sync;

pub use error::{ PipeError, Result };
pub use insights::init_tracy;
pub use pipe::{
    open,
    MpmcPipe,
    Offsets,
    PipeBuffer,
    PipeConfig,
    PipeKind,
    ReadSpan,
    Sequence,
    SpscPipe,
    SpscReader,
    SpscWriter,
    StorageKind,
    WriteSpan,
};
