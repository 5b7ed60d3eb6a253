//! Logging context and subscriber setup.
//!
//! The library never installs a global subscriber on its own. Applications
//! call [`init`] once (or install their own `tracing` subscriber) and hand a
//! [`LogContext`] to each client, server and connection they build. Every task
//! a component spawns runs inside the context's span, so each event carries
//! the facility and, for connections, the peer address.
//!
//! The seven-level scale used by peers of this protocol (trace, debug, info,
//! warn, notice, error, crit) is mapped onto `tracing` levels: `notice` is an
//! INFO event with `notice = true`, `crit` an ERROR event with
//! `critical = true`. See [`notice!`] and [`crit!`].

use serde::{Deserialize, Serialize};
use tracing::{Level, Span};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Severity scale accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Notice,
    Error,
    Crit,
}

impl LogLevel {
    /// The `tracing` level events of this severity are emitted at.
    pub fn as_tracing(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info | LogLevel::Notice => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error | LogLevel::Crit => Level::ERROR,
        }
    }

    /// Lowest `tracing` level admitted when this is the configured threshold.
    ///
    /// `notice` and `crit` have no filter level of their own; `notice` admits
    /// WARN and above (so plain INFO is dropped) and `crit` admits ERROR.
    fn threshold(self) -> Level {
        match self {
            LogLevel::Notice => Level::WARN,
            LogLevel::Crit => Level::ERROR,
            other => other.as_tracing(),
        }
    }
}

/// Subsystem tag attached to every event of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facility {
    #[default]
    App,
    Db,
    Game,
    User,
}

impl Facility {
    pub fn as_str(self) -> &'static str {
        match self {
            Facility::App => "app",
            Facility::Db => "db",
            Facility::Game => "game",
            Facility::User => "user",
        }
    }
}

/// Explicitly constructed logging context, injected into each component.
#[derive(Debug, Clone)]
pub struct LogContext {
    facility: Facility,
    span: Span,
}

impl LogContext {
    pub fn new(facility: Facility) -> Self {
        Self {
            facility,
            span: tracing::info_span!("framelink", facility = facility.as_str()),
        }
    }

    /// A context whose span records nothing.
    pub fn disabled() -> Self {
        Self {
            facility: Facility::App,
            span: Span::none(),
        }
    }

    pub fn facility(&self) -> Facility {
        self.facility
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child context for one component (`"client"`, `"server"`).
    pub fn component(&self, name: &'static str) -> Self {
        Self {
            facility: self.facility,
            span: tracing::info_span!(parent: &self.span, "component", name),
        }
    }

    /// Child context for one connection.
    pub fn peer(&self, peer_addr: &str) -> Self {
        Self {
            facility: self.facility,
            span: tracing::info_span!(parent: &self.span, "conn", peer = %peer_addr),
        }
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new(Facility::App)
    }
}

/// Emit a `notice`-level event.
macro_rules! notice {
    ($($arg:tt)+) => {
        tracing::info!(notice = true, $($arg)+)
    };
}

/// Emit a `crit`-level event.
macro_rules! crit {
    ($($arg:tt)+) => {
        tracing::error!(critical = true, $($arg)+)
    };
}

pub(crate) use crit;
pub(crate) use notice;

/// Install a fmt subscriber with timestamps, caller location and thread ids,
/// and return the root [`LogContext`] for `config.facility`.
///
/// `RUST_LOG` takes precedence over `config.level`. A global subscriber that
/// is already installed is kept; that is not an error.
pub fn init(config: &LoggingConfig) -> LogContext {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.threshold().as_str()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!("global subscriber already set, keeping it");
    }

    LogContext::new(config.facility)
}
