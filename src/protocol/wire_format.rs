//! Wire format encoding and decoding.
//!
//! Implements the 16-byte header format:
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬──────────┐
//! │ Cmd      │ Size     │ Seq      │ Session  │ Version  │
//! │ 4 bytes  │ 4 bytes  │ 4 bytes  │ 2 bytes  │ 2 bytes  │
//! │ uint32 BE│ uint32 BE│ uint32 BE│ uint16 BE│ uint16 BE│
//! └──────────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. `Size` counts payload bytes only;
//! the header itself is not included.
//!
//! A wider 20-byte variant with `Session`/`Version` as `u32` exists in older
//! peers. It is not wire compatible with this layout.

use crate::error::{FramelinkError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Header {
    /// Command identifier.
    pub cmd: u32,
    /// Payload length in bytes.
    pub size: u32,
    /// Sequence number (reserved, carried verbatim).
    pub seq: u32,
    /// Session tag (reserved, carried verbatim).
    pub session: u16,
    /// Protocol version (reserved, carried verbatim).
    pub version: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(cmd: u32, size: u32, seq: u32, session: u16, version: u16) -> Self {
        Self {
            cmd,
            size,
            seq,
            session,
            version,
        }
    }

    /// Header for `cmd` carrying `payload_len` bytes, reserved fields zeroed.
    ///
    /// # Panics
    ///
    /// Panics if `payload_len` does not fit the 32-bit size field. Use
    /// [`Header::try_for_payload`] for lengths that are not known to fit.
    pub fn for_payload(cmd: u32, payload_len: usize) -> Self {
        match Self::try_for_payload(cmd, payload_len) {
            Ok(header) => header,
            Err(err) => panic!("{}", err),
        }
    }

    /// Fallible [`Header::for_payload`]: a length above `u32::MAX` is a
    /// format error.
    pub fn try_for_payload(cmd: u32, payload_len: usize) -> Result<Self> {
        let size = u32::try_from(payload_len).map_err(|_| {
            FramelinkError::Format(format!("payload of {} bytes does not fit a frame", payload_len))
        })?;
        Ok(Self {
            cmd,
            size,
            ..Self::default()
        })
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use framelink::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::new(7, 5, 0, 0, 1);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..4], &[0, 0, 0, 7]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into the first 16 bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.cmd.to_be_bytes());
        buf[4..8].copy_from_slice(&self.size.to_be_bytes());
        buf[8..12].copy_from_slice(&self.seq.to_be_bytes());
        buf[12..14].copy_from_slice(&self.session.to_be_bytes());
        buf[14..16].copy_from_slice(&self.version.to_be_bytes());
    }

    /// Decode header from the first 16 bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`FramelinkError::Format`] if fewer than 16 bytes are supplied.
    ///
    /// # Example
    ///
    /// ```
    /// use framelink::protocol::Header;
    ///
    /// let bytes = [0, 0, 0, 7, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 1];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.cmd, 7);
    /// assert_eq!(header.size, 5);
    /// assert_eq!(header.version, 1);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(FramelinkError::Format(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }
        Ok(Self {
            cmd: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            size: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            seq: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            session: u16::from_be_bytes([buf[12], buf[13]]),
            version: u16::from_be_bytes([buf[14], buf[15]]),
        })
    }

    /// Total frame length on the wire (header + payload).
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.size as usize
    }

    /// Reject payloads above `max_payload_size`.
    pub fn check_size(&self, max_payload_size: u32) -> Result<()> {
        if self.size > max_payload_size {
            return Err(FramelinkError::Format(format!(
                "payload size {} exceeds maximum {}",
                self.size, max_payload_size
            )));
        }
        Ok(())
    }
}

/// Encode a header to bytes (standalone function).
#[inline]
pub fn encode_header(header: &Header) -> [u8; HEADER_SIZE] {
    header.encode()
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    Header::decode(buf)
}
