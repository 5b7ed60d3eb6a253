//! Frame reassembly over a [`StreamBuffer`].
//!
//! Implements a two-state machine for handling fragmented frames:
//! - waiting for header: fewer than 16 bytes buffered, nothing decoded
//! - waiting for payload: header decoded and validated, need `16 + size` bytes
//!
//! The decoded header is held while the payload trickles in, so the size
//! check and the application validator run exactly once per frame.
//!
//! # Example
//!
//! ```
//! use framelink::protocol::{build_frame, FrameBuffer, Header};
//!
//! let wire = build_frame(&Header::for_payload(1, 2), b"hi");
//! let mut buffer = FrameBuffer::new();
//!
//! buffer.extend(&wire[..10]);
//! assert!(buffer.next_frame(|_| Ok(())).unwrap().is_none());
//!
//! buffer.extend(&wire[10..]);
//! let frame = buffer.next_frame(|_| Ok(())).unwrap().unwrap();
//! assert_eq!(frame.payload(), b"hi");
//! ```

use super::stream_buffer::StreamBuffer;
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// Accumulates incoming bytes and cuts them into complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    stream: StreamBuffer,
    /// Header already decoded and accepted, waiting for its payload.
    pending: Option<Header>,
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a frame buffer with a custom payload limit.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            stream: StreamBuffer::new(),
            pending: None,
            max_payload_size,
        }
    }

    /// Append raw bytes from a transport read.
    pub fn extend(&mut self, data: &[u8]) {
        self.stream.write(data);
    }

    /// Try to cut one complete frame off the front of the buffer.
    ///
    /// `validate` sees every header once, before its payload is awaited.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(Format)` on an oversized frame, or the validator's error
    pub fn next_frame<F>(&mut self, mut validate: F) -> Result<Option<Frame>>
    where
        F: FnMut(&Header) -> Result<()>,
    {
        let header = match self.pending {
            Some(header) => header,
            None => {
                let Some(raw) = self.stream.copy(HEADER_SIZE) else {
                    return Ok(None);
                };
                let header = Header::decode(raw)?;
                header.check_size(self.max_payload_size)?;
                validate(&header)?;
                self.pending = Some(header);
                header
            }
        };

        if self.stream.size() < header.frame_len() {
            return Ok(None);
        }

        self.pending = None;
        let mut raw = self.stream.read(header.frame_len());
        let payload = raw.split_off(HEADER_SIZE);
        Ok(Some(Frame::new(header, payload)))
    }

    /// Append `data` and extract every frame that is now complete.
    pub fn push<F>(&mut self, data: &[u8], mut validate: F) -> Result<Vec<Frame>>
    where
        F: FnMut(&Header) -> Result<()>,
    {
        self.extend(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(&mut validate)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered bytes (including a pending header).
    pub fn len(&self) -> usize {
        self.stream.size()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    /// Whether a header has been accepted and its payload is outstanding.
    pub fn is_waiting_for_payload(&self) -> bool {
        self.pending.is_some()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.stream.clear();
        self.pending = None;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
