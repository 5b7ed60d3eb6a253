//! One framed connection and its three tasks.
//!
//! ```text
//!            ┌──────────┐  inbound (32)  ┌────────────┐
//! socket ──► │  reader  │ ─────────────► │ dispatcher │ ─► on_packet
//!            └──────────┘                └────────────┘
//!            ┌──────────┐  outbound (32)
//! socket ◄── │  writer  │ ◄───────────── send_packet
//!            └──────────┘
//! ```
//!
//! State machine: `Created → Alive → Closed`. Any transport error, an
//! expired deadline, a malformed or rejected header, or an explicit
//! [`Connection::close`] moves it to `Closed`, which is terminal. Both queues
//! are bounded; a full inbound queue stalls the reader and a full outbound
//! queue stalls `send_packet`.

mod reader;
mod writer;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::codec::MsgPackCodec;
use crate::config::ConnectionConfig;
use crate::error::{FramelinkError, Result};
use crate::handler::ConnectionHandler;
use crate::logging::{crit, notice, LogContext};
use crate::protocol::{build_frame, Frame, Header};
use crate::transport::{BoxedStream, Transport};

const CREATED: u8 = 0;
const ALIVE: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle position of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built, tasks not started. Sends fail.
    Created,
    /// Tasks running.
    Alive,
    /// Terminal.
    Closed,
}

/// A framed connection. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    peer_addr: String,
    config: ConnectionConfig,
    log: LogContext,
    handler: Arc<dyn ConnectionHandler>,
    /// Liveness flag, readable without locks by owners and the server sweep.
    state: AtomicU8,
    /// Dropped on close so the outbound queue stops accepting.
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    /// Stream and queue receiver, handed to the tasks on start.
    parts: Mutex<Option<Parts>>,
    shutdown: watch::Sender<bool>,
}

struct Parts {
    stream: BoxedStream,
    outbound_rx: mpsc::Receiver<Bytes>,
}

impl Connection {
    /// Build a connection over `transport`. Nothing runs until [`start`].
    ///
    /// [`start`]: Connection::start
    pub fn new(transport: Transport, handler: Arc<dyn ConnectionHandler>) -> Self {
        let (stream, peer_addr, config, log) = transport.into_parts();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                peer_addr,
                config,
                log,
                handler,
                state: AtomicU8::new(CREATED),
                outbound: Mutex::new(Some(outbound_tx)),
                parts: Mutex::new(Some(Parts {
                    stream,
                    outbound_rx,
                })),
                shutdown,
            }),
        }
    }

    /// Spawn the reader, writer and dispatcher tasks and mark the connection
    /// alive.
    ///
    /// Fails with [`FramelinkError::NotAlive`] if the connection was already
    /// started or closed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self
            .inner
            .state
            .compare_exchange(CREATED, ALIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FramelinkError::NotAlive);
        }
        let Some(parts) = self.inner.parts.lock().take() else {
            return Err(FramelinkError::NotAlive);
        };

        let (read_half, write_half) = tokio::io::split(parts.stream);
        let (frame_tx, frame_rx) = mpsc::channel(self.inner.config.inbound_capacity.max(1));
        let span = self.inner.log.span().clone();

        tokio::spawn(
            reader::run(
                self.clone(),
                read_half,
                frame_tx,
                self.inner.shutdown.subscribe(),
            )
            .instrument(span.clone()),
        );
        tokio::spawn(
            writer::run(
                self.clone(),
                write_half,
                parts.outbound_rx,
                self.inner.shutdown.subscribe(),
            )
            .instrument(span.clone()),
        );
        let dispatcher = tokio::spawn(dispatch_loop(self.clone(), frame_rx).instrument(span.clone()));
        tokio::spawn(supervise(self.clone(), dispatcher).instrument(span));

        let _enter = self.inner.log.span().enter();
        notice!(peer = %self.inner.peer_addr, "connection alive");
        Ok(())
    }

    /// Queue `buf` for the writer, waiting while the outbound queue is full.
    ///
    /// `buf` is written verbatim; it should hold one or more whole frames.
    pub async fn send_packet(&self, buf: impl Into<Bytes>) -> Result<()> {
        let tx = self.outbound_sender()?;
        tx.send(buf.into())
            .await
            .map_err(|_| FramelinkError::NotAlive)
    }

    /// Queue `buf` without waiting.
    ///
    /// Returns [`FramelinkError::QueueFull`] when the outbound queue is at
    /// capacity.
    pub fn try_send_packet(&self, buf: impl Into<Bytes>) -> Result<()> {
        let tx = self.outbound_sender()?;
        tx.try_send(buf.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FramelinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => FramelinkError::NotAlive,
        })
    }

    /// Frame `payload` under `cmd` and queue it.
    pub async fn send_frame(&self, cmd: u32, payload: &[u8]) -> Result<()> {
        let header = Header::try_for_payload(cmd, payload.len())?;
        self.send_packet(build_frame(&header, payload)).await
    }

    /// MsgPack-encode `value` and send it as the payload of `cmd`.
    pub async fn send_message<T: serde::Serialize>(&self, cmd: u32, value: &T) -> Result<()> {
        let payload = MsgPackCodec::encode(value)?;
        self.send_frame(cmd, &payload).await
    }

    /// Move to `Closed`: stop accepting sends, release the queues, shut the
    /// transport down and fire `on_closed`.
    ///
    /// Idempotent; only the first call has any effect.
    pub fn close(&self) {
        if self.inner.state.swap(CLOSED, Ordering::AcqRel) == CLOSED {
            return;
        }

        self.inner.outbound.lock().take();
        // A connection closed before start still owns its stream.
        self.inner.parts.lock().take();
        self.inner.shutdown.send_replace(true);

        {
            let _enter = self.inner.log.span().enter();
            notice!(peer = %self.inner.peer_addr, "connection closed");
        }
        self.inner.handler.on_closed(self);
    }

    /// Liveness flag.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ALIVE
    }

    pub fn state(&self) -> ConnectionState {
        match self.inner.state.load(Ordering::Acquire) {
            CREATED => ConnectionState::Created,
            ALIVE => ConnectionState::Alive,
            _ => ConnectionState::Closed,
        }
    }

    /// Remote address string this connection was built with.
    pub fn peer_addr(&self) -> &str {
        &self.inner.peer_addr
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn handler(&self) -> &dyn ConnectionHandler {
        self.inner.handler.as_ref()
    }

    fn outbound_sender(&self) -> Result<mpsc::Sender<Bytes>> {
        if !self.is_alive() {
            return Err(FramelinkError::NotAlive);
        }
        self.inner
            .outbound
            .lock()
            .clone()
            .ok_or(FramelinkError::NotAlive)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.inner.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Deliver frames to the handler one at a time, in arrival order.
///
/// Runs until the reader drops its end of the queue; frames already queued
/// when the connection closes are still delivered.
async fn dispatch_loop(conn: Connection, mut frames: mpsc::Receiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        conn.handler().on_packet(&conn, frame).await;
    }
}

/// Close the connection if the dispatcher dies from a handler panic.
async fn supervise(conn: Connection, dispatcher: JoinHandle<()>) {
    if let Err(err) = dispatcher.await {
        if err.is_panic() {
            crit!(peer = %conn.peer_addr(), "packet handler panicked, closing connection");
            conn.close();
        }
    }
}
