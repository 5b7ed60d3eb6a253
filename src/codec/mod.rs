//! Payload helpers.
//!
//! The framing layer treats payloads as opaque bytes. Applications that want
//! structured payloads use [`MsgPackCodec`]; [`Connection::send_message`]
//! encodes through it.
//!
//! [`Connection::send_message`]: crate::Connection::send_message
//!
//! # Example
//!
//! ```
//! use framelink::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&("login", 42u32)).unwrap();
//! let decoded: (String, u32) = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, ("login".to_string(), 42));
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
