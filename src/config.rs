//! Configuration for connections, the client, the server and logging.
//!
//! Every struct deserializes from JSON with all fields optional; missing
//! fields take the defaults below. Durations are written in milliseconds.
//!
//! ```
//! use framelink::config::ServerConfig;
//!
//! let config = ServerConfig::from_json_str(r#"{ "port": 1001, "sweep_interval_ms": 250 }"#).unwrap();
//! assert_eq!(config.port, 1001);
//! assert_eq!(config.sweep_interval.as_millis(), 250);
//! assert_eq!(config.connection.outbound_capacity, 32);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::logging::{Facility, LogLevel};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default transport read size per reader iteration.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Default capacity of the inbound frame queue and outbound buffer queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default rolling deadline on each transport read and write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(300);

/// Default client tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on a single dial attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default server sweep cadence.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Bytes requested from the transport per read.
    pub read_chunk_size: usize,
    /// Frames buffered between reader and dispatcher.
    pub inbound_capacity: usize,
    /// Buffers queued for the writer before `send_packet` blocks.
    pub outbound_capacity: usize,
    /// Rolling deadline on every transport read and write.
    #[serde(rename = "io_timeout_ms", with = "millis")]
    pub io_timeout: Duration,
    /// Frames declaring a larger payload are rejected.
    pub max_payload_size: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            inbound_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Reconnecting client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` to dial.
    pub addr: String,
    #[serde(rename = "tick_interval_ms", with = "millis")]
    pub tick_interval: Duration,
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:1001".to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Connection-registry server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
    #[serde(rename = "sweep_interval_ms", with = "millis")]
    pub sweep_interval: Duration,
    pub connection: ConnectionConfig,
}

impl ServerConfig {
    /// Listen on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// `bind_addr:port` as passed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 1001,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Log subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level; overridden by `RUST_LOG` when set.
    pub level: LogLevel,
    pub facility: Facility,
    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Debug,
            facility: Facility::App,
            ansi: true,
        }
    }
}

macro_rules! impl_json_loading {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Parse from a JSON document.
            pub fn from_json_str(json: &str) -> Result<Self> {
                Ok(serde_json::from_str(json)?)
            }

            /// Read and parse a JSON file.
            pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
                let text = std::fs::read_to_string(path)?;
                Self::from_json_str(&text)
            }
        }
    )*};
}

impl_json_loading!(ConnectionConfig, ClientConfig, ServerConfig, LoggingConfig);

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
