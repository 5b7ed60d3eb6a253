//! Append-only byte accumulator for reassembling reads.
//!
//! Socket reads arrive in arbitrary chunks. `StreamBuffer` collects them and
//! lets the reader peek at a prefix (`copy`) before deciding to consume it
//! (`read`). Backed by `bytes::BytesMut`, so consuming a prefix hands out a
//! `Bytes` without copying the remainder.

use bytes::{Bytes, BytesMut};

/// Default initial capacity for a connection's reassembly buffer.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Reassembly buffer bridging read-chunk boundaries and frame boundaries.
#[derive(Debug)]
pub struct StreamBuffer {
    buffer: BytesMut,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append bytes at the tail.
    pub fn write(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes available.
    #[inline]
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Read-only view of the first `n` bytes, without consuming them.
    ///
    /// Returns `None` when fewer than `n` bytes are buffered.
    pub fn copy(&self, n: usize) -> Option<&[u8]> {
        if self.buffer.len() < n {
            return None;
        }
        Some(&self.buffer[..n])
    }

    /// Consume and return the first `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.size()`. Callers check `size()` (or `copy`) first.
    pub fn read(&mut self, n: usize) -> Bytes {
        assert!(
            n <= self.buffer.len(),
            "StreamBuffer::read({}) with only {} bytes buffered",
            n,
            self.buffer.len()
        );
        self.buffer.split_to(n).freeze()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_accumulates() {
        let mut buf = StreamBuffer::new();
        assert!(buf.is_empty());

        buf.write(b"hel");
        buf.write(b"lo");
        assert_eq!(buf.size(), 5);
        assert_eq!(buf.copy(5), Some(&b"hello"[..]));
    }

    #[test]
    fn test_copy_does_not_consume() {
        let mut buf = StreamBuffer::new();
        buf.write(b"abcdef");

        assert_eq!(buf.copy(3), Some(&b"abc"[..]));
        assert_eq!(buf.copy(3), Some(&b"abc"[..]));
        assert_eq!(buf.size(), 6);
    }

    #[test]
    fn test_copy_not_enough_data() {
        let mut buf = StreamBuffer::new();
        buf.write(b"abc");
        assert_eq!(buf.copy(4), None);
        assert_eq!(buf.copy(0), Some(&b""[..]));
    }

    #[test]
    fn test_read_consumes_prefix() {
        let mut buf = StreamBuffer::new();
        buf.write(b"headerpayload");

        let head = buf.read(6);
        assert_eq!(&head[..], b"header");
        assert_eq!(buf.size(), 7);
        assert_eq!(buf.copy(7), Some(&b"payload"[..]));

        let rest = buf.read(7);
        assert_eq!(&rest[..], b"payload");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_then_write_keeps_order() {
        let mut buf = StreamBuffer::new();
        buf.write(b"one");
        let _ = buf.read(2);
        buf.write(b"two");
        assert_eq!(&buf.read(4)[..], b"etwo");
    }

    #[test]
    #[should_panic(expected = "only 2 bytes buffered")]
    fn test_read_past_end_panics() {
        let mut buf = StreamBuffer::new();
        buf.write(b"ab");
        let _ = buf.read(3);
    }

    #[test]
    fn test_clear() {
        let mut buf = StreamBuffer::with_capacity(8);
        buf.write(b"leftover");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.copy(1), None);
    }
}
