//! Handler module - the callback capability set a connection reports to.
//!
//! Applications implement [`ConnectionHandler`] (or wrap a closure with
//! [`handler_fn`]) and inject it when a [`Connection`] is built. The same
//! handler may serve many connections; each callback receives the connection
//! it concerns.
//!
//! # Example
//!
//! ```
//! use framelink::{BoxFuture, Connection, ConnectionHandler, Frame, FramelinkError, Header, Result};
//!
//! struct Echo;
//!
//! impl ConnectionHandler for Echo {
//!     fn on_packet<'a>(&'a self, conn: &'a Connection, frame: Frame) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             let _ = conn.send_packet(frame.to_bytes()).await;
//!         })
//!     }
//!
//!     fn on_validate_header(&self, header: &Header) -> Result<()> {
//!         if header.cmd == 0 {
//!             return Err(FramelinkError::Validation("cmd 0 is reserved".into()));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::{Frame, Header};

/// Boxed future returned by callbacks and pluggable async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callbacks a connection invokes over its lifetime.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A complete frame arrived.
    ///
    /// Runs on the connection's dispatcher task. Frames are delivered one at
    /// a time in arrival order; the next frame waits until this future
    /// completes. A panic here closes the connection.
    fn on_packet<'a>(&'a self, conn: &'a Connection, frame: Frame) -> BoxFuture<'a, ()>;

    /// The connection moved to closed. Called exactly once.
    fn on_closed(&self, _conn: &Connection) {}

    /// Inspect a header before its payload is read.
    ///
    /// Returning an error closes the connection.
    fn on_validate_header(&self, _header: &Header) -> Result<()> {
        Ok(())
    }
}

/// Handler that ignores every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl ConnectionHandler for Discard {
    fn on_packet<'a>(&'a self, conn: &'a Connection, frame: Frame) -> BoxFuture<'a, ()> {
        tracing::debug!(
            peer = %conn.peer_addr(),
            cmd = frame.cmd(),
            "discarding frame, no handler installed"
        );
        Box::pin(async {})
    }
}

/// Closure-backed handler, see [`handler_fn`].
pub struct FnHandler<F> {
    on_packet: F,
}

impl<F, Fut> ConnectionHandler for FnHandler<F>
where
    F: Fn(Connection, Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_packet<'a>(&'a self, conn: &'a Connection, frame: Frame) -> BoxFuture<'a, ()> {
        Box::pin((self.on_packet)(conn.clone(), frame))
    }
}

/// Build a handler from an `on_packet` closure; the other callbacks keep
/// their defaults.
pub fn handler_fn<F, Fut>(on_packet: F) -> Arc<dyn ConnectionHandler>
where
    F: Fn(Connection, Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler { on_packet })
}
