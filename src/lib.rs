//! # framelink
//!
//! Length-prefixed TCP framing with a reconnecting client and a
//! connection-registry server.
//!
//! Every message on the wire is a 16-byte big-endian header followed by
//! `size` payload bytes:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬───────────┬───────────┬─────────────┐
//! │ cmd: u32 │ size: u32│ seq: u32 │ session:16│ version:16│ payload ... │
//! └──────────┴──────────┴──────────┴───────────┴───────────┴─────────────┘
//! ```
//!
//! ## Architecture
//!
//! - [`Connection`]: one stream, three tasks (reader, dispatcher, writer)
//!   joined by bounded queues; reports to a [`ConnectionHandler`]
//! - [`Client`]: keeps one connection up, with login and keepalive hooks
//! - [`Server`]: accepts connections, keys them by remote address, sweeps
//!   out the closed ones
//!
//! ## Example
//!
//! ```ignore
//! use framelink::config::{LoggingConfig, ServerConfig};
//! use framelink::{handler_fn, logging, Client, Server, Transport};
//!
//! #[tokio::main]
//! async fn main() -> framelink::Result<()> {
//!     let log = logging::init(&LoggingConfig::default());
//!
//!     let echo = handler_fn(|conn, frame| async move {
//!         let _ = conn.send_packet(frame.to_bytes()).await;
//!     });
//!     let server = Server::new(
//!         ServerConfig::with_port(1001),
//!         move |transport: Transport| Some(transport.into_connection(echo.clone())),
//!         log,
//!     );
//!     server.start().await?;
//!
//!     let client = Client::builder("127.0.0.1:1001").start();
//!     client.send_frame(7, b"hello").await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transport;

mod client;
mod connection;

pub use client::{Client, ClientBuilder, ClientState, NoHooks, SessionHooks};
pub use connection::{Connection, ConnectionState};
pub use error::{FramelinkError, Result};
pub use handler::{handler_fn, BoxFuture, ConnectionHandler, Discard};
pub use logging::LogContext;
pub use protocol::{Frame, Header};
pub use server::{ConnectionFactory, Server};
pub use transport::{Dialer, TcpDialer, Transport};
