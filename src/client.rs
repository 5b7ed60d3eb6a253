//! Reconnecting client.
//!
//! A [`Client`] holds at most one [`Connection`] and drives it from a single
//! periodic tick. Each tick does exactly one thing:
//!
//! 1. no connection, or the connection died: dial and start a new one
//! 2. connected but not logged in: run the login hook
//! 3. logged in: run the keepalive hook
//!
//! Application code decides when the session counts as logged in (usually in
//! its packet handler, after a login reply) and calls
//! [`Client::set_logged_in`].
//!
//! # Example
//!
//! ```ignore
//! use framelink::{BoxFuture, Client, SessionHooks};
//!
//! struct Hooks;
//!
//! impl SessionHooks for Hooks {
//!     fn login<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             let _ = client.send_frame(1, b"user:secret").await;
//!         })
//!     }
//! }
//!
//! let client = Client::builder("127.0.0.1:1001").hooks(Hooks).start();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::Instrument;

use crate::config::{ClientConfig, ConnectionConfig};
use crate::connection::Connection;
use crate::error::{FramelinkError, Result};
use crate::handler::{BoxFuture, ConnectionHandler, Discard};
use crate::logging::{notice, LogContext};
use crate::transport::tcp::timed_out;
use crate::transport::{Dialer, TcpDialer};

/// Session-level hooks the tick invokes. All default to no-ops.
pub trait SessionHooks: Send + Sync + 'static {
    /// A new connection was dialed and started.
    fn on_connected<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Runs every tick while connected and not logged in.
    fn login<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Runs every tick while logged in.
    fn keep_alive<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SessionHooks for NoHooks {}

/// Where the client is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    /// A dial is in flight.
    Connecting,
    Connected,
    LoggedIn,
}

/// Builder for a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    dialer: Option<Arc<dyn Dialer>>,
    handler: Arc<dyn ConnectionHandler>,
    hooks: Arc<dyn SessionHooks>,
    log: LogContext,
}

impl ClientBuilder {
    /// Client dialing `addr` over TCP with default settings.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::from_config(ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            dialer: None,
            handler: Arc::new(Discard),
            hooks: Arc::new(NoHooks),
            log: LogContext::disabled(),
        }
    }

    /// Target `host:port`. Ignored when a custom dialer is set.
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Delay between ticks.
    ///
    /// Default: 1 second
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Bound on a single dial attempt.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Settings applied to every connection the client builds.
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.config.connection = config;
        self
    }

    /// Callbacks for every connection the client builds.
    pub fn handler(mut self, handler: Arc<dyn ConnectionHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn hooks<H: SessionHooks>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Replace TCP dialing, e.g. with an in-memory transport.
    pub fn dialer<D: Dialer>(mut self, dialer: D) -> Self {
        self.dialer = Some(Arc::new(dialer));
        self
    }

    pub fn log(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    /// Build the client without starting its tick task.
    ///
    /// Drive it with [`Client::tick`], or use [`start`](Self::start).
    pub fn build(self) -> Client {
        let dialer = self
            .dialer
            .unwrap_or_else(|| Arc::new(TcpDialer::new(self.config.addr.clone())));
        let (shutdown, _) = watch::channel(false);

        Client {
            inner: Arc::new(ClientInner {
                log: self.log.component("client"),
                config: self.config,
                dialer,
                handler: self.handler,
                hooks: self.hooks,
                connection: Mutex::new(None),
                connecting: AtomicBool::new(false),
                logged_in: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Build the client and spawn its tick task. The first tick fires after
    /// one interval.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(self) -> Client {
        let client = self.build();
        client.spawn_ticker();
        client
    }
}

/// Reconnecting client. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    dialer: Arc<dyn Dialer>,
    handler: Arc<dyn ConnectionHandler>,
    hooks: Arc<dyn SessionHooks>,
    log: LogContext,
    connection: Mutex<Option<Connection>>,
    connecting: AtomicBool,
    logged_in: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Client {
    pub fn builder(addr: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(addr)
    }

    /// Run one tick: reconnect, log in or keep alive.
    pub async fn tick(&self) {
        if self.is_shut_down() {
            return;
        }

        match self.connection() {
            Some(conn) if conn.is_alive() => {
                if self.is_logged_in() {
                    self.inner.hooks.keep_alive(self).await;
                } else {
                    self.inner.hooks.login(self).await;
                }
            }
            _ => match self.reconnect().await {
                Ok(conn) => {
                    notice!(addr = %self.inner.dialer.target(), peer = %conn.peer_addr(), "connected");
                    self.inner.hooks.on_connected(self).await;
                }
                Err(err) => {
                    tracing::error!(addr = %self.inner.dialer.target(), error = %err, "connect failed");
                }
            },
        }
    }

    /// Queue `buf` on the current connection.
    pub async fn send_data(&self, buf: impl Into<Bytes>) -> Result<()> {
        let conn = self.connection().ok_or(FramelinkError::NoConnection)?;
        conn.send_packet(buf).await
    }

    /// Frame `payload` under `cmd` and queue it on the current connection.
    pub async fn send_frame(&self, cmd: u32, payload: &[u8]) -> Result<()> {
        let conn = self.connection().ok_or(FramelinkError::NoConnection)?;
        conn.send_frame(cmd, payload).await
    }

    /// Mark the session logged in (or not). Reset on every reconnect.
    pub fn set_logged_in(&self, logged_in: bool) {
        self.inner.logged_in.store(logged_in, Ordering::Release);
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.logged_in.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ClientState {
        if self.inner.connecting.load(Ordering::Acquire) {
            return ClientState::Connecting;
        }
        match self.connection() {
            Some(conn) if conn.is_alive() => {
                if self.is_logged_in() {
                    ClientState::LoggedIn
                } else {
                    ClientState::Connected
                }
            }
            _ => ClientState::Disconnected,
        }
    }

    /// The connection currently held, alive or not.
    pub fn connection(&self) -> Option<Connection> {
        self.inner.connection.lock().clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Stop ticking and close the held connection. Further ticks do nothing.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let conn = self.inner.connection.lock().take();
        if let Some(conn) = conn {
            conn.close();
        }
        tracing::debug!(parent: self.inner.log.span(), "client shut down");
    }

    fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    async fn reconnect(&self) -> Result<Connection> {
        self.inner.connecting.store(true, Ordering::Release);
        let result = self.dial_and_start().await;
        self.inner.connecting.store(false, Ordering::Release);
        result
    }

    async fn dial_and_start(&self) -> Result<Connection> {
        tracing::debug!(addr = %self.inner.dialer.target(), "dialing");
        let transport = match timeout(self.inner.config.connect_timeout, self.inner.dialer.dial()).await {
            Ok(dialed) => dialed?,
            Err(_) => return Err(timed_out("connect").into()),
        };

        let log = self.inner.log.peer(transport.peer_addr());
        let conn = transport
            .with_config(self.inner.config.connection.clone())
            .with_log(log)
            .into_connection(Arc::clone(&self.inner.handler));

        self.set_logged_in(false);
        conn.start()?;

        let previous = self.inner.connection.lock().replace(conn.clone());
        if let Some(previous) = previous {
            previous.close();
        }
        // Lost a race with shutdown: don't keep the new connection around.
        if self.is_shut_down() {
            self.inner.connection.lock().take();
            conn.close();
            return Err(FramelinkError::NotAlive);
        }
        Ok(conn)
    }

    fn spawn_ticker(&self) {
        let span = self.inner.log.span().clone();
        tokio::spawn(
            tick_loop(
                Arc::downgrade(&self.inner),
                self.inner.config.tick_interval,
                self.inner.shutdown.subscribe(),
            )
            .instrument(span),
        );
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("target", &self.inner.dialer.target())
            .field("state", &self.state())
            .finish()
    }
}

/// Ticks until shutdown or until every [`Client`] handle is dropped.
async fn tick_loop(inner: Weak<ClientInner>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        }

        let Some(inner) = inner.upgrade() else { break };
        let client = Client { inner };
        tokio::select! {
            _ = client.tick() => {}
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        }
    }
    tracing::debug!("tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameBuffer, Header};
    use crate::transport::Transport;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::sync::mpsc;

    /// Fails `failures` times, then hands out in-memory transports whose
    /// remote ends go to `peers`.
    struct FlakyDialer {
        failures: usize,
        attempts: Arc<AtomicUsize>,
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    impl Dialer for FlakyDialer {
        fn dial(&self) -> BoxFuture<'_, Result<Transport>> {
            Box::pin(async move {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < self.failures {
                    return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
                }
                let (local, remote) = tokio::io::duplex(4096);
                let _ = self.peers.send(remote);
                Ok(Transport::new(local, format!("memory-{}", attempt)))
            })
        }
    }

    fn flaky(failures: usize) -> (FlakyDialer, Arc<AtomicUsize>, mpsc::UnboundedReceiver<DuplexStream>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let dialer = FlakyDialer {
            failures,
            attempts: attempts.clone(),
            peers: tx,
        };
        (dialer, attempts, rx)
    }

    #[derive(Default)]
    struct CountingHooks {
        connected: AtomicUsize,
        logins: AtomicUsize,
        keepalives: AtomicUsize,
    }

    impl SessionHooks for Arc<CountingHooks> {
        fn on_connected<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, ()> {
            self.connected.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }

        fn login<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = client.send_frame(1, b"login").await;
            })
        }

        fn keep_alive<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
            self.keepalives.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = client.send_frame(2, b"").await;
            })
        }
    }

    #[tokio::test]
    async fn test_reconnects_within_n_plus_one_ticks() {
        let (dialer, attempts, _peers) = flaky(3);
        let client = ClientBuilder::new("unused").dialer(dialer).build();

        assert_eq!(client.state(), ClientState::Disconnected);
        for tick in 1..=3 {
            client.tick().await;
            assert_eq!(attempts.load(Ordering::SeqCst), tick);
            assert_eq!(client.state(), ClientState::Disconnected);
        }

        client.tick().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(client.state(), ClientState::Connected);
        assert_eq!(client.connection().unwrap().peer_addr(), "memory-3");
    }

    #[tokio::test]
    async fn test_login_then_keepalive() {
        let (dialer, attempts, mut peers) = flaky(0);
        let hooks = Arc::new(CountingHooks::default());
        let client = ClientBuilder::new("unused")
            .dialer(dialer)
            .hooks(hooks.clone())
            .build();

        client.tick().await;
        assert_eq!(hooks.connected.load(Ordering::SeqCst), 1);
        let mut remote = peers.recv().await.unwrap();

        client.tick().await;
        client.tick().await;
        assert_eq!(hooks.logins.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.keepalives.load(Ordering::SeqCst), 0);

        client.set_logged_in(true);
        assert_eq!(client.state(), ClientState::LoggedIn);
        client.tick().await;
        assert_eq!(hooks.keepalives.load(Ordering::SeqCst), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        // Two login frames then one keepalive frame reach the peer.
        let expected_len = 2 * (16 + 5) + 16;
        let mut wire = vec![0u8; expected_len];
        remote.read_exact(&mut wire).await.unwrap();
        let frames = FrameBuffer::new().push(&wire, |_| Ok(())).unwrap();
        let cmds: Vec<u32> = frames.iter().map(|f| f.cmd()).collect();
        assert_eq!(cmds, vec![1, 1, 2]);
    }

    #[tokio::test]
    async fn test_dead_connection_redialed_and_login_reset() {
        let (dialer, attempts, mut peers) = flaky(0);
        let client = ClientBuilder::new("unused").dialer(dialer).build();

        client.tick().await;
        let first = client.connection().unwrap();
        let _remote = peers.recv().await.unwrap();
        client.set_logged_in(true);

        first.close();
        assert_eq!(client.state(), ClientState::Disconnected);

        client.tick().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(client.state(), ClientState::Connected);
        assert!(!client.is_logged_in());
        assert!(!client.connection().unwrap().ptr_eq(&first));
    }

    #[tokio::test]
    async fn test_send_data_without_connection() {
        let (dialer, _attempts, _peers) = flaky(usize::MAX);
        let client = ClientBuilder::new("unused").dialer(dialer).build();

        let err = client.send_data(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, FramelinkError::NoConnection));
    }

    #[tokio::test]
    async fn test_send_data_delegates() {
        let (dialer, _attempts, mut peers) = flaky(0);
        let client = ClientBuilder::new("unused").dialer(dialer).build();
        client.tick().await;
        let mut remote = peers.recv().await.unwrap();

        let frame = build_frame(&Header::for_payload(9, 3), b"abc");
        client.send_data(frame.clone()).await.unwrap();

        let mut wire = vec![0u8; frame.len()];
        remote.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire[..], &frame[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let client = ClientBuilder::new("unused")
            .connect_timeout(Duration::from_secs(2))
            .dialer(|| async {
                std::future::pending::<()>().await;
                Err::<Transport, _>(FramelinkError::NotAlive)
            })
            .build();

        client.tick().await;
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.connection().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_and_shutdown() {
        let (dialer, attempts, _peers) = flaky(1);
        let client = ClientBuilder::new("unused")
            .tick_interval(Duration::from_secs(1))
            .dialer(dialer)
            .start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(client.state(), ClientState::Connected);

        let conn = client.connection().unwrap();
        client.shutdown();
        assert!(!conn.is_alive());
        assert_eq!(client.state(), ClientState::Disconnected);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        client.tick().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
