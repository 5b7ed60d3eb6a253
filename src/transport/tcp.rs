//! TCP dialing and listening.
//!
//! # Example
//!
//! ```ignore
//! use framelink::transport::{Dialer, TcpDialer};
//!
//! let dialer = TcpDialer::new("127.0.0.1:1001");
//! let transport = dialer.dial().await?;
//! ```

use std::future::Future;
use std::io;

use tokio::net::{TcpListener, TcpStream};

use super::Transport;
use crate::error::Result;
use crate::handler::BoxFuture;

/// Produces a fresh transport on each call; the client dials through this.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self) -> BoxFuture<'_, Result<Transport>>;

    /// Human-readable target, for logs.
    fn target(&self) -> String {
        "<custom>".to_string()
    }
}

impl<F, Fut> Dialer for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Transport>> + Send + 'static,
{
    fn dial(&self) -> BoxFuture<'_, Result<Transport>> {
        Box::pin(self())
    }
}

/// Dials a fixed `host:port` over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Dialer for TcpDialer {
    fn dial(&self) -> BoxFuture<'_, Result<Transport>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr).await?;
            Transport::from_tcp(stream)
        })
    }

    fn target(&self) -> String {
        self.addr.clone()
    }
}

/// Bind a listener on `addr` (`host:port`).
pub async fn bind(addr: &str) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// `TimedOut` I/O error for an expired deadline.
pub(crate) fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} deadline expired", what))
}
