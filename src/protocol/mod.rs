//! Protocol module - wire format, reassembly, and frame types.
//!
//! This module implements the binary framing layer:
//! - 16-byte header encoding/decoding
//! - Stream buffer for accumulating partial reads
//! - Frame buffer that cuts the stream into complete frames

mod frame;
mod frame_buffer;
mod stream_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use stream_buffer::StreamBuffer;
pub use wire_format::{decode_header, encode_header, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
