pub mod clickhouse;
pub mod emitter;
pub mod http;
pub mod spool;

use std::fmt;
use std::future::Future;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use self::clickhouse::ClickHouseChannel;
use self::http::HttpChannel;

pub use emitter::DualSinkEmitter;
pub use spool::{JsonlSpool, SpoolHead};

/// One analytical-sink row per persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRow {
    pub ts_ms: u64,
    pub dur_us: u64,
    pub ok: bool,
    pub session_id: String,
    pub event_id: String,
    pub content_hash: String,
    pub name: String,
    pub subject: Option<String>,
}

/// Where accepted rows are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// `Native` when a remote URL is configured, otherwise `File`.
    #[default]
    Auto,
    /// Native channel only; undelivered rows go to the fallback queue.
    Native,
    /// Native channel and spool.
    Mirror,
    /// Spool only.
    File,
    Off,
}

impl SinkMode {
    /// Parses a mode name. Empty input means `Auto`; unknown input falls
    /// back to `File`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Self::Auto,
            "mirror" | "dual" | "both" => Self::Mirror,
            "file" | "spool" | "local-file" | "secondary-only" => Self::File,
            "off" | "none" | "disabled" => Self::Off,
            "native" | "local" | "remote" | "remote-only" | "primary-only" => Self::Native,
            _ => Self::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Native => "native",
            Self::Mirror => "mirror",
            Self::File => "file",
            Self::Off => "off",
        }
    }

    /// Settles `Auto`; every other mode is returned as is.
    pub fn resolve(self, has_remote_url: bool) -> Self {
        match self {
            Self::Auto if has_remote_url => Self::Native,
            Self::Auto => Self::File,
            other => other,
        }
    }

    /// False for an unresolved `Auto`.
    pub fn uses_native(&self) -> bool {
        matches!(self, Self::Native | Self::Mirror)
    }
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SinkMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Low-overhead push path to the analytical sink.
///
/// Selected once at construction; `probe` runs once at startup and a failed
/// probe is never retried.
pub trait AnalyticalSinkChannel: Send + Sync + 'static {
    /// Returns the channel name for logging.
    fn name(&self) -> &'static str;

    /// Checks that the sink is reachable.
    fn probe(&self) -> impl Future<Output = Result<()>> + Send;

    /// Pushes a batch of rows.
    fn push(&self, rows: &[SinkRow]) -> impl Future<Output = Result<()>> + Send;
}

/// Native channel implementations, dispatched by enum rather than trait
/// objects so `push` stays a plain future.
pub enum NativeChannel {
    ClickHouse(ClickHouseChannel),
    Http(HttpChannel),
}

impl AnalyticalSinkChannel for NativeChannel {
    fn name(&self) -> &'static str {
        match self {
            Self::ClickHouse(c) => c.name(),
            Self::Http(c) => c.name(),
        }
    }

    async fn probe(&self) -> Result<()> {
        match self {
            Self::ClickHouse(c) => c.probe().await,
            Self::Http(c) => c.probe().await,
        }
    }

    async fn push(&self, rows: &[SinkRow]) -> Result<()> {
        match self {
            Self::ClickHouse(c) => c.push(rows).await,
            Self::Http(c) => c.push(rows).await,
        }
    }
}
