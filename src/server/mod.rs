//! Server module - accepts connections and tracks them by remote address.
//!
//! The server owns two tasks: an accept loop that turns each inbound stream
//! into a [`Connection`] through the application's [`ConnectionFactory`], and
//! a sweep that drops registry entries whose connection has closed. The
//! server never closes a connection on its own; [`Server::close_all`] does
//! so on request.
//!
//! # Example
//!
//! ```ignore
//! use framelink::config::ServerConfig;
//! use framelink::{handler_fn, LogContext, Server, Transport};
//!
//! let echo = handler_fn(|conn, frame| async move {
//!     let _ = conn.send_packet(frame.to_bytes()).await;
//! });
//! let server = Server::new(
//!     ServerConfig::with_port(1001),
//!     move |transport: Transport| Some(transport.into_connection(echo.clone())),
//!     LogContext::default(),
//! );
//! let addr = server.start().await?;
//! ```

mod registry;

pub use registry::Registry;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{FramelinkError, Result};
use crate::logging::{notice, LogContext};
use crate::transport::{tcp, Transport};

/// Builds a connection for an accepted transport, or declines it.
///
/// The transport already carries the server's connection settings and a
/// per-peer log context. Return the connection unstarted; the server starts
/// it after registration.
pub trait ConnectionFactory: Send + Sync + 'static {
    fn create(&self, transport: Transport) -> Option<Connection>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(Transport) -> Option<Connection> + Send + Sync + 'static,
{
    fn create(&self, transport: Transport) -> Option<Connection> {
        self(transport)
    }
}

/// Accepting server. Cheap to clone.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: ServerConfig,
    factory: Box<dyn ConnectionFactory>,
    registry: Registry,
    log: LogContext,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: watch::Sender<bool>,
}

impl Server {
    pub fn new<F: ConnectionFactory>(config: ServerConfig, factory: F, log: LogContext) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(ServerInner {
                config,
                factory: Box::new(factory),
                registry: Registry::new(),
                log: log.component("server"),
                local_addr: Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Bind the listener and spawn the accept and sweep tasks.
    ///
    /// Returns the bound address. Bind failures are returned, not logged
    /// and swallowed.
    pub async fn start(&self) -> Result<SocketAddr> {
        let listener = tcp::bind(&self.inner.config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;
        *self.inner.local_addr.lock() = Some(local_addr);

        let span = self.inner.log.span().clone();
        tokio::spawn(accept_loop(self.clone(), listener, self.inner.shutdown.subscribe()).instrument(span.clone()));
        tokio::spawn(sweep_loop(self.clone(), self.inner.shutdown.subscribe()).instrument(span));

        let _enter = self.inner.log.span().enter();
        notice!(%local_addr, "listening");
        Ok(local_addr)
    }

    /// Run one accepted transport through the factory, registry and start.
    ///
    /// Returns `Ok(None)` when the factory declines. A duplicate remote
    /// address fails with [`FramelinkError::RegistrationConflict`]; the new
    /// connection is dropped unstarted and the registered one is untouched.
    /// Registration and start happen together, so a live connection is
    /// always in the registry.
    pub fn admit(&self, transport: Transport) -> Result<Option<Connection>> {
        let peer_addr = transport.peer_addr().to_string();
        let transport = transport
            .with_config(self.inner.config.connection.clone())
            .with_log(self.inner.log.peer(&peer_addr));

        let Some(conn) = self.inner.factory.create(transport) else {
            tracing::warn!(peer = %peer_addr, "factory declined connection");
            return Ok(None);
        };

        match self.inner.registry.register_with(&conn, Connection::start) {
            Ok(()) => Ok(Some(conn)),
            Err(err @ FramelinkError::RegistrationConflict(_)) => {
                tracing::error!(peer = %peer_addr, error = %err, "registration conflict, dropping new connection");
                Err(err)
            }
            // The factory handed back a connection that was already started
            // or closed.
            Err(err) => Err(err),
        }
    }

    /// Remove closed connections from the registry. Returns the removed keys.
    pub fn sweep(&self) -> Vec<String> {
        let removed = self.inner.registry.sweep();
        for peer in &removed {
            tracing::info!(parent: self.inner.log.span(), peer = %peer, "removed closed connection");
        }
        removed
    }

    /// Stop accepting and sweeping. Registered connections stay open.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        tracing::debug!(parent: self.inner.log.span(), "server shut down");
    }

    /// Close every registered connection and empty the registry.
    pub fn close_all(&self) {
        for conn in self.inner.registry.drain() {
            conn.close();
        }
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn get(&self, peer_addr: &str) -> Option<Connection> {
        self.inner.registry.get(peer_addr)
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("connections", &self.connection_count())
            .finish()
    }
}

async fn accept_loop(server: Server, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        };

        let (stream, remote) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::error!(error = %err, "accept failed");
                continue;
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(peer = %remote, error = %err, "set_nodelay failed");
        }

        match server.admit(Transport::new(stream, remote.to_string())) {
            Ok(Some(_)) => tracing::debug!(peer = %remote, "accepted"),
            Ok(None) | Err(FramelinkError::RegistrationConflict(_)) => {}
            Err(err) => tracing::error!(peer = %remote, error = %err, "failed to admit connection"),
        }
    }
    tracing::debug!("accept loop stopped");
}

async fn sweep_loop(server: Server, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(server.inner.config.sweep_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        }
        server.sweep();
    }
    tracing::debug!("sweep loop stopped");
}
