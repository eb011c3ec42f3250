use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{AnalyticalSinkChannel, JsonlSpool, NativeChannel, SinkMode, SinkRow};
use crate::config::{NativeKind, SinkConfig};
use crate::ingest::stats::EngineStats;

/// Best-effort mirror of accepted rows to the analytical sink.
///
/// The native channel is probed once in [`DualSinkEmitter::connect`]. Rows
/// the native channel should have taken but did not, whether the push
/// failed or the probe did, are appended to the fallback queue. Each writer
/// tick replays a bounded head of that queue through the channel.
pub struct DualSinkEmitter<C = NativeChannel> {
    mode: SinkMode,
    native: Option<C>,
    spool: Option<JsonlSpool>,
    fallback: Option<JsonlSpool>,
    replay_batch: usize,
    stats: Arc<EngineStats>,
}

impl DualSinkEmitter<NativeChannel> {
    /// Builds the configured native channel, probes it once and returns the
    /// emitter. Never fails; an unusable channel degrades to the spool.
    pub async fn from_config(cfg: &SinkConfig, stats: Arc<EngineStats>) -> Self {
        let channel = if cfg.effective_mode().uses_native() {
            match build_channel(cfg) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!(error = %e, "native sink channel unusable, queueing rows locally");
                    None
                }
            }
        } else {
            None
        };

        Self::connect(cfg, channel, stats).await
    }
}

impl<C: AnalyticalSinkChannel> DualSinkEmitter<C> {
    /// Resolves `cfg.mode`, probes `channel` and assembles the emitter.
    pub async fn connect(cfg: &SinkConfig, channel: Option<C>, stats: Arc<EngineStats>) -> Self {
        let mode = cfg.effective_mode();
        if cfg.mode == SinkMode::Auto {
            debug!(mode = %mode, "resolved auto sink mode");
        }

        let native = match channel {
            Some(channel) if mode.uses_native() => match channel.probe().await {
                Ok(()) => {
                    info!(channel = channel.name(), mode = %mode, "analytical sink connected");
                    Some(channel)
                }
                Err(e) => {
                    warn!(
                        channel = channel.name(),
                        error = %e,
                        "analytical sink unavailable, queueing rows locally",
                    );
                    None
                }
            },
            _ => None,
        };

        let spool = match mode {
            SinkMode::Mirror | SinkMode::File => {
                Some(JsonlSpool::new(&cfg.spool_path, cfg.spool_max_bytes))
            }
            _ => None,
        };

        let fallback = mode
            .uses_native()
            .then(|| JsonlSpool::new(&cfg.fallback_path, cfg.spool_max_bytes));

        Self {
            mode,
            native,
            spool,
            fallback,
            replay_batch: cfg.replay_batch,
            stats,
        }
    }

    /// The resolved mode; never `Auto`.
    pub fn mode(&self) -> SinkMode {
        self.mode
    }

    /// True when the native channel passed its startup probe.
    pub fn native_active(&self) -> bool {
        self.native.is_some()
    }

    /// False in `Off` mode, so callers can skip building rows.
    pub fn wants_rows(&self) -> bool {
        self.mode != SinkMode::Off
    }

    /// Routes one batch. Errors are counted and logged, never returned.
    pub async fn emit(&self, rows: &[SinkRow]) {
        if rows.is_empty() {
            return;
        }

        match self.mode {
            SinkMode::Native => {
                if !self.push_native(rows).await {
                    self.append(self.fallback.as_ref(), &self.stats.sink_queued, rows)
                        .await;
                }
            }
            SinkMode::Mirror => {
                // Independent best-effort writes.
                let (pushed, ()) = tokio::join!(
                    self.push_native(rows),
                    self.append(self.spool.as_ref(), &self.stats.sink_spooled, rows),
                );
                if !pushed {
                    self.append(self.fallback.as_ref(), &self.stats.sink_queued, rows)
                        .await;
                }
            }
            SinkMode::File => {
                self.append(self.spool.as_ref(), &self.stats.sink_spooled, rows)
                    .await
            }
            SinkMode::Auto | SinkMode::Off => {}
        }
    }

    /// Pushes up to `replay_batch` queued lines through the native channel
    /// and drops them from the queue once accepted. Lines that fail stay
    /// queued for the next tick; unreadable lines are discarded.
    ///
    /// Returns the number of rows delivered.
    pub async fn replay_fallback(&self) -> usize {
        let (Some(native), Some(fallback)) = (&self.native, &self.fallback) else {
            return 0;
        };
        if self.replay_batch == 0 {
            return 0;
        }

        let head = match fallback.read_head(self.replay_batch).await {
            Ok(head) => head,
            Err(e) => {
                debug!(path = %fallback.path().display(), error = %e, "reading fallback queue failed");
                return 0;
            }
        };
        if head.lines.is_empty() {
            return 0;
        }

        let rows: Vec<SinkRow> = head
            .lines
            .iter()
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(row) => Some(row),
                Err(e) => {
                    debug!(error = %e, "discarding unreadable fallback line");
                    None
                }
            })
            .collect();

        if !rows.is_empty() && native.push(&rows).await.is_err() {
            // Still down; try again next tick.
            return 0;
        }

        if let Err(e) = fallback.consume(head.bytes).await {
            // The rows went out but remain queued and will be sent again.
            EngineStats::incr(&self.stats.sink_errors);
            warn!(path = %fallback.path().display(), error = %e, "trimming fallback queue failed");
        }

        if !rows.is_empty() {
            EngineStats::add(&self.stats.sink_rows, rows.len() as u64);
            EngineStats::add(&self.stats.sink_replayed, rows.len() as u64);
            debug!(channel = native.name(), rows = rows.len(), "replayed fallback rows");
        }
        rows.len()
    }

    /// False when there is no channel or the push failed.
    async fn push_native(&self, rows: &[SinkRow]) -> bool {
        let Some(native) = &self.native else {
            return false;
        };

        match native.push(rows).await {
            Ok(()) => {
                EngineStats::add(&self.stats.sink_rows, rows.len() as u64);
                true
            }
            Err(e) => {
                EngineStats::incr(&self.stats.sink_errors);
                warn!(channel = native.name(), rows = rows.len(), error = %e, "native sink push failed");
                false
            }
        }
    }

    async fn append(&self, target: Option<&JsonlSpool>, counter: &AtomicU64, rows: &[SinkRow]) {
        let Some(target) = target else {
            return;
        };

        match target.append(rows).await {
            Ok(()) => EngineStats::add(counter, rows.len() as u64),
            Err(e) => {
                EngineStats::incr(&self.stats.sink_errors);
                debug!(path = %target.path().display(), error = %e, "spool append failed");
            }
        }
    }
}

fn build_channel(cfg: &SinkConfig) -> Result<NativeChannel> {
    Ok(match cfg.native_kind() {
        NativeKind::Clickhouse => {
            NativeChannel::ClickHouse(super::clickhouse::ClickHouseChannel::new(&cfg.clickhouse))
        }
        NativeKind::Http => NativeChannel::Http(super::http::HttpChannel::new(cfg.http.clone())?),
    })
}
