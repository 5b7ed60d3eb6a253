//! Ping Client - a reconnecting client with login and keepalive hooks.
//!
//! This example demonstrates:
//! - Building a `Client` with `SessionHooks`
//! - Marking the session logged in from the packet handler
//! - Sending MsgPack payloads
//!
//! # Running
//!
//! ```text
//! cargo run --example echo_server
//! cargo run --example ping_client -- 127.0.0.1:1001
//! ```
//!
//! Against the echo server the login frame comes straight back, which this
//! client treats as a successful login. Stop the server and start it again to
//! watch the client reconnect and log in anew.

use std::sync::{Arc, OnceLock};

use framelink::codec::MsgPackCodec;
use framelink::config::LoggingConfig;
use framelink::logging::{self, Facility};
use framelink::{handler_fn, BoxFuture, Client, Connection, Frame, SessionHooks};
use serde::{Deserialize, Serialize};

const CMD_LOGIN: u32 = 1;
const CMD_PING: u32 = 2;

#[derive(Serialize, Deserialize, Debug)]
struct Login {
    user: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct Ping {
    sent_at_ms: u128,
}

struct Hooks {
    user: String,
}

impl SessionHooks for Hooks {
    fn on_connected<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            tracing::info!(state = ?client.state(), "connected, logging in");
        })
    }

    fn login<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let login = Login {
                user: self.user.clone(),
            };
            if let Some(conn) = client.connection() {
                if let Err(err) = conn.send_message(CMD_LOGIN, &login).await {
                    tracing::warn!(error = %err, "login send failed");
                }
            }
        })
    }

    fn keep_alive<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let ping = Ping {
                sent_at_ms: now_ms(),
            };
            if let Some(conn) = client.connection() {
                let _ = conn.send_message(CMD_PING, &ping).await;
            }
        })
    }
}

fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:1001".to_string());
    let log = logging::init(&LoggingConfig {
        facility: Facility::User,
        ..LoggingConfig::default()
    });

    // The handler needs the client, which needs the handler.
    let client_slot: Arc<OnceLock<Client>> = Arc::new(OnceLock::new());
    let slot = client_slot.clone();
    let handler = handler_fn(move |_conn: Connection, frame: Frame| {
        let slot = slot.clone();
        async move {
            match frame.cmd() {
                CMD_LOGIN => {
                    if let Some(client) = slot.get() {
                        client.set_logged_in(true);
                        tracing::info!("logged in");
                    }
                }
                CMD_PING => {
                    if let Ok(ping) = MsgPackCodec::decode::<Ping>(frame.payload()) {
                        tracing::info!(rtt_ms = now_ms().saturating_sub(ping.sent_at_ms) as u64, "pong");
                    }
                }
                other => tracing::debug!(cmd = other, "unexpected frame"),
            }
        }
    });

    let client = Client::builder(addr)
        .handler(handler)
        .hooks(Hooks {
            user: "demo".to_string(),
        })
        .log(log)
        .start();
    let _ = client_slot.set(client.clone());

    tokio::signal::ctrl_c().await?;
    client.shutdown();

    Ok(())
}
