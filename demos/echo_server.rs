//! Echo Server - every frame a client sends comes straight back.
//!
//! This example demonstrates:
//! - Loading `ServerConfig` and `LoggingConfig` from JSON
//! - A connection factory that shares one handler across connections
//! - Shutting down on Ctrl-C
//!
//! # Running
//!
//! ```text
//! cargo run --example echo_server -- server.json
//! RUST_LOG=trace cargo run --example echo_server
//! ```
//!
//! With no argument the server listens on `0.0.0.0:1001`.

use std::sync::Arc;

use framelink::config::{LoggingConfig, ServerConfig};
use framelink::logging::{self, Facility};
use framelink::{BoxFuture, Connection, ConnectionHandler, Frame, Server, Transport};

struct Echo;

impl ConnectionHandler for Echo {
    fn on_packet<'a>(&'a self, conn: &'a Connection, frame: Frame) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(err) = conn.send_packet(frame.to_bytes()).await {
                tracing::warn!(peer = %conn.peer_addr(), error = %err, "echo failed");
            }
        })
    }

    fn on_closed(&self, conn: &Connection) {
        tracing::info!(peer = %conn.peer_addr(), "client left");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    let log = logging::init(&LoggingConfig {
        facility: Facility::Game,
        ..LoggingConfig::default()
    });

    let handler: Arc<dyn ConnectionHandler> = Arc::new(Echo);
    let server = Server::new(
        config,
        move |transport: Transport| Some(transport.into_connection(handler.clone())),
        log,
    );
    let addr = server.start().await?;
    tracing::info!(%addr, "echo server ready, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.close_all();

    Ok(())
}
