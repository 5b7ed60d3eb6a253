//! Integration tests for framelink.
//!
//! These run a real server and client over loopback TCP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framelink::codec::MsgPackCodec;
use framelink::config::ServerConfig;
use framelink::protocol::{build_frame, FrameBuffer, Header};
use framelink::{
    handler_fn, BoxFuture, Client, ClientBuilder, ClientState, Connection, ConnectionHandler, Frame,
    FramelinkError, LogContext, Result, Server, SessionHooks, Transport,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn loopback_config(port: u16) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1".to_string(),
        port,
        sweep_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    }
}

/// Server that echoes every frame and rejects cmd 0.
fn echo_server(port: u16) -> Server {
    struct Echo;

    impl ConnectionHandler for Echo {
        fn on_packet<'a>(&'a self, conn: &'a Connection, frame: Frame) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let _ = conn.send_packet(frame.to_bytes()).await;
            })
        }

        fn on_validate_header(&self, header: &Header) -> Result<()> {
            if header.cmd == 0 {
                return Err(FramelinkError::Validation("cmd 0 is reserved".into()));
            }
            Ok(())
        }
    }

    let handler: Arc<dyn ConnectionHandler> = Arc::new(Echo);
    Server::new(
        loopback_config(port),
        move |transport: Transport| Some(transport.into_connection(handler.clone())),
        LogContext::disabled(),
    )
}

/// Client whose received frames land in the returned channel.
fn collecting_client(addr: &str) -> (ClientBuilder, mpsc::UnboundedReceiver<Frame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = handler_fn(move |_conn: Connection, frame: Frame| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(frame);
        }
    });
    let builder = ClientBuilder::new(addr).handler(handler);
    (builder, rx)
}

async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

/// Client connects on its first tick and gets its frames echoed back.
#[tokio::test]
async fn test_client_server_echo() {
    let server = echo_server(0);
    let addr = server.start().await.unwrap().to_string();
    let (builder, mut frames) = collecting_client(&addr);
    let client = builder.build();

    client.tick().await;
    assert_eq!(client.state(), ClientState::Connected);
    eventually("server registration", || server.connection_count() == 1).await;

    for cmd in 1..=3u32 {
        client.send_frame(cmd, format!("msg-{}", cmd).as_bytes()).await.unwrap();
    }
    for cmd in 1..=3u32 {
        let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
        assert_eq!(frame.cmd(), cmd);
        assert_eq!(frame.payload(), format!("msg-{}", cmd).as_bytes());
    }

    // The registry key is the client's local address as the server sees it.
    let conn = client.connection().unwrap();
    let server_side = server.registry().connections();
    assert_eq!(server_side.len(), 1);
    assert_ne!(server_side[0].peer_addr(), conn.peer_addr());

    client.shutdown();
    server.shutdown();
    server.close_all();
}

/// MsgPack payloads survive the round trip through the server.
#[tokio::test]
async fn test_msgpack_message_roundtrip() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Login {
        user: String,
        token: u64,
    }

    let server = echo_server(0);
    let addr = server.start().await.unwrap().to_string();
    let (builder, mut frames) = collecting_client(&addr);
    let client = builder.build();
    client.tick().await;

    let login = Login {
        user: "alice".to_string(),
        token: 0xDEAD_BEEF,
    };
    client
        .connection()
        .unwrap()
        .send_message(10, &login)
        .await
        .unwrap();

    let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame.cmd(), 10);
    let decoded: Login = MsgPackCodec::decode(frame.payload()).unwrap();
    assert_eq!(decoded, login);

    client.shutdown();
    server.shutdown();
    server.close_all();
}

/// A header the server rejects closes the connection; the sweep then drops it.
#[tokio::test]
async fn test_rejected_header_closes_and_sweeps() {
    let server = echo_server(0);
    let addr = server.start().await.unwrap().to_string();
    let (builder, _frames) = collecting_client(&addr);
    let client = builder.build();

    client.tick().await;
    eventually("server registration", || server.connection_count() == 1).await;
    let server_conn = server.registry().connections().remove(0);

    client.send_frame(0, b"reserved").await.unwrap();

    eventually("server-side close", || !server_conn.is_alive()).await;
    eventually("client-side close", || client.state() == ClientState::Disconnected).await;
    eventually("sweep", || server.connection_count() == 0).await;

    // Next tick dials again.
    client.tick().await;
    assert_eq!(client.state(), ClientState::Connected);
    eventually("re-registration", || server.connection_count() == 1).await;

    client.shutdown();
    server.shutdown();
    server.close_all();
}

/// Dropping the client removes its entry within one sweep.
#[tokio::test]
async fn test_sweep_after_client_disconnect() {
    let server = echo_server(0);
    let addr = server.start().await.unwrap().to_string();
    let (builder, _frames) = collecting_client(&addr);
    let client = builder.build();

    client.tick().await;
    eventually("server registration", || server.connection_count() == 1).await;

    client.shutdown();
    eventually("sweep", || server.connection_count() == 0).await;

    server.shutdown();
}

/// The ticking client comes back by itself after the server restarts.
#[tokio::test]
async fn test_client_reconnects_after_server_restart() {
    let first = echo_server(0);
    let addr = first.start().await.unwrap();

    let (builder, mut frames) = collecting_client(&addr.to_string());
    let client = builder.tick_interval(Duration::from_millis(50)).start();
    eventually("first connect", || client.state() == ClientState::Connected).await;
    let original = client.connection().unwrap();

    first.shutdown();
    first.close_all();
    eventually("client notices close", || !original.is_alive()).await;

    // The old listener goes away once its accept loop observes shutdown.
    let second = echo_server(addr.port());
    let mut bound = false;
    for _ in 0..100 {
        if second.start().await.is_ok() {
            bound = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(bound, "could not rebind {}", addr);

    eventually("reconnect", || {
        second.connection_count() == 1
            && client.state() == ClientState::Connected
            && client.connection().map_or(false, |c| !c.ptr_eq(&original))
    })
    .await;

    client.send_frame(4, b"again").await.unwrap();
    let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame.payload(), b"again");

    client.shutdown();
    second.shutdown();
    second.close_all();
}

/// Login runs each tick until the application marks the session logged in,
/// then keepalive takes over.
#[tokio::test]
async fn test_login_and_keepalive_hooks() {
    #[derive(Default)]
    struct Counts {
        logins: AtomicUsize,
        keepalives: AtomicUsize,
    }

    struct Hooks(Arc<Counts>);

    impl SessionHooks for Hooks {
        fn login<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
            self.0.logins.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = client.send_frame(100, b"login").await;
            })
        }

        fn keep_alive<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
            self.0.keepalives.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = client.send_frame(101, b"").await;
            })
        }
    }

    let server = echo_server(0);
    let addr = server.start().await.unwrap().to_string();
    let counts = Arc::new(Counts::default());
    let (builder, mut frames) = collecting_client(&addr);
    let client = builder.hooks(Hooks(counts.clone())).build();

    client.tick().await;
    client.tick().await;
    let echoed = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(echoed.cmd(), 100);
    client.set_logged_in(true);

    client.tick().await;
    let echoed = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(echoed.cmd(), 101);
    assert_eq!(counts.logins.load(Ordering::SeqCst), 1);
    assert_eq!(counts.keepalives.load(Ordering::SeqCst), 1);

    client.shutdown();
    server.shutdown();
    server.close_all();
}

/// Frames built by hand parse the same regardless of how they are chunked.
#[test]
fn test_fragmented_frame_parsing() {
    let payload = MsgPackCodec::encode(&("fragmented", 7u32)).unwrap();
    let header = Header::new(3, payload.len() as u32, 12345, 2, 1);
    let wire = build_frame(&header, &payload);

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for byte in wire.iter() {
        frames.extend(buffer.push(&[*byte], |_| Ok(())).unwrap());
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header, header);
    let decoded: (String, u32) = MsgPackCodec::decode(frames[0].payload()).unwrap();
    assert_eq!(decoded, ("fragmented".to_string(), 7));
}
