//! Error types for pipebuf.
//!
//! Short transfers are not errors: `read`/`write` report how many bytes moved.
//! Errors cover contract violations only.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipeError>;

#[derive(Error, Debug)]
pub enum PipeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid capacity {capacity}: {reason}")]
    InvalidCapacity { capacity: usize, reason: &'static str },

    #[error("Span was not reserved from this buffer")]
    ForeignSpan,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl PipeError {
    pub fn capacity(capacity: usize, reason: &'static str) -> Self {
        Self::InvalidCapacity { capacity, reason }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// True for errors raised by capacity validation.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::InvalidCapacity { .. })
    }
}
