//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use framelink::protocol::{build_frame, Frame, Header};
//! use bytes::Bytes;
//!
//! let header = Header::new(7, 5, 0, 0, 1);
//! let wire = build_frame(&header, b"hello");
//! assert_eq!(wire.len(), 21);
//!
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//! assert_eq!(frame.cmd(), 7);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes, exactly `header.size` long.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Frame for `cmd` whose header size is taken from the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload is longer than `u32::MAX` bytes.
    pub fn with_payload(cmd: u32, payload: Bytes) -> Self {
        Self {
            header: Header::for_payload(cmd, payload.len()),
            payload,
        }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn cmd(&self) -> u32 {
        self.header.cmd
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Encode header and payload into one contiguous wire buffer.
    pub fn to_bytes(&self) -> Bytes {
        build_frame(&self.header, &self.payload)
    }
}

/// Build a complete wire frame from a header and its payload.
///
/// The header is written as given; callers that want `size` derived from the
/// payload use [`Header::for_payload`].
pub fn build_frame(header: &Header, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.freeze()
}
