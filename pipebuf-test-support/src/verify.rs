//! Order-sensitive stream checks.

use crc32fast::Hasher;

/// CRC32 over every byte seen, in the order seen.
///
/// Two digests agree only if both sides saw the same bytes in the same
/// order, however the stream was chunked.
#[derive(Clone, Default)]
pub struct StreamDigest {
    hasher: Hasher,
    bytes: u64,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.bytes += bytes.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}
