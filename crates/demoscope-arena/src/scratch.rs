//! Reusable payload buffer for the message currently being decoded.
//!
//! [`MessageBuffer`] holds the raw payload bytes of one container message.
//! It is refilled for every message; the backing storage is kept across
//! messages so that a long run of small payloads costs no heap traffic.
//! Payloads up to [`MessageBuffer::INLINE_CAPACITY`] bytes live inline.

use smallvec::SmallVec;

/// Growable scratch buffer for one message payload.
pub struct MessageBuffer {
    data: SmallVec<[u8; 8192]>,
}

impl MessageBuffer {
    /// Bytes stored inline before spilling to the heap.
    pub const INLINE_CAPACITY: usize = 8192;

    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            data: SmallVec::new(),
        }
    }

    /// Resize to exactly `len` zeroed bytes and return them for filling.
    ///
    /// Previous contents are discarded.
    pub fn prepare(&mut self, len: usize) -> &mut [u8] {
        self.data.clear();
        self.data.resize(len, 0);
        &mut self.data[..]
    }

    /// Replace the contents with a copy of `bytes`.
    pub fn fill_from(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    /// Drop the contents, keeping the capacity.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// The payload currently held.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of payload bytes held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the payload has spilled to the heap.
    pub fn spilled(&self) -> bool {
        self.data.spilled()
    }

    /// Capacity of the current storage in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
