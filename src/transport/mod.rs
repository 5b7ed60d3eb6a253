//! Transport module - byte streams a connection runs on.
//!
//! A [`Transport`] bundles a connected stream with its remote address string
//! and the settings the resulting connection will use. TCP is the production
//! transport (see [`tcp`]); any `AsyncRead + AsyncWrite` stream works, which
//! is how tests drive connections over `tokio::io::duplex`.

pub mod tcp;

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::handler::ConnectionHandler;
use crate::logging::LogContext;

pub use tcp::{Dialer, TcpDialer};

/// Any bidirectional byte stream a connection can own.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// A connected stream waiting to become a [`Connection`].
pub struct Transport {
    stream: BoxedStream,
    peer_addr: String,
    config: ConnectionConfig,
    log: LogContext,
}

impl Transport {
    /// Wrap a connected stream. `peer_addr` is the registry key on a server.
    pub fn new<S: AsyncStream>(stream: S, peer_addr: impl Into<String>) -> Self {
        Self {
            stream: Box::new(stream),
            peer_addr: peer_addr.into(),
            config: ConnectionConfig::default(),
            log: LogContext::disabled(),
        }
    }

    /// Wrap a TCP stream, keyed by its remote socket address.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, peer_addr.to_string()))
    }

    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Build a connection (not yet started) reporting to `handler`.
    pub fn into_connection(self, handler: Arc<dyn ConnectionHandler>) -> Connection {
        Connection::new(self, handler)
    }

    pub(crate) fn into_parts(self) -> (BoxedStream, String, ConnectionConfig, LogContext) {
        (self.stream, self.peer_addr, self.config, self.log)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("peer_addr", &self.peer_addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_methods() {
        let (stream, _peer) = tokio::io::duplex(64);
        let config = ConnectionConfig {
            io_timeout: Duration::from_secs(5),
            ..ConnectionConfig::default()
        };

        let transport = Transport::new(stream, "10.1.1.1:4000").with_config(config.clone());

        assert_eq!(transport.peer_addr(), "10.1.1.1:4000");
        assert_eq!(transport.config(), &config);
        assert!(format!("{:?}", transport).contains("10.1.1.1:4000"));
    }

    #[tokio::test]
    async fn test_from_tcp_uses_remote_addr() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = client.unwrap();
        let (_server_side, remote) = accepted.unwrap();

        let transport = Transport::from_tcp(client).unwrap();
        assert_eq!(transport.peer_addr(), addr.to_string());
        assert_ne!(remote, addr);
    }
}
