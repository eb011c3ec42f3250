use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::export::HealthMetrics;
use crate::ingest::stats::EngineStats;
use crate::ingest::IngestState;
use crate::persist::{AsyncPersistenceWriter, BatchSettings, BatchWriter};
use crate::query;
use crate::record::Event;
use crate::sink::{AnalyticalSinkChannel, DualSinkEmitter};
use crate::store::{FileFrameStore, FrameStore};

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Cheap, cloneable handle used by callers on the hot path.
#[derive(Clone)]
pub struct Recorder {
    state: Arc<IngestState>,
}

impl Recorder {
    /// Records one event. Never blocks and never fails; an empty `name` is
    /// ignored.
    pub fn record(
        &self,
        name: &str,
        timestamp_ms: u64,
        duration_us: u64,
        ok: bool,
        subject: Option<&str>,
    ) {
        self.state
            .record(&Event::new(name, timestamp_ms, duration_us, ok, subject));
    }

    pub fn record_event(&self, event: &Event<'_>) {
        self.state.record(event);
    }

    pub fn metrics_json(&self) -> String {
        query::metrics_json(&self.state)
    }

    /// Newest `max_events` records, oldest first.
    pub fn tail_json(&self, max_events: i32) -> String {
        query::tail_json(&self.state, max_events)
    }

    pub fn session_id(&self) -> &str {
        self.state.session_id()
    }

    pub fn state(&self) -> &Arc<IngestState> {
        &self.state
    }
}

/// A running engine: ingest state, persistence task, optional health server.
pub struct Engine {
    recorder: Recorder,
    health: Option<Arc<HealthMetrics>>,
    health_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    writer: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
}

impl Engine {
    /// Starts an engine backed by the file frame store and the configured
    /// analytical sink.
    ///
    /// A store that cannot be opened disables persistence instead of failing.
    /// Errors only for invalid configuration or a health server that cannot
    /// bind.
    pub async fn init(cfg: Config) -> Result<Self> {
        cfg.validate()?;

        let path = cfg.store.path.clone();
        let initial_size = cfg.store.initial_size;
        let opened = tokio::task::spawn_blocking(move || {
            FileFrameStore::open_or_create(&path, initial_size)
        })
        .await
        .context("opening frame store")?;

        let store = match opened {
            Ok(store) => {
                info!(path = %store.path().display(), frames = store.len(), "frame store opened");
                Some(store)
            }
            Err(e) => {
                warn!(
                    path = %cfg.store.path.display(),
                    error = %e,
                    "frame store unavailable, persistence disabled",
                );
                None
            }
        };

        let stats = Arc::new(EngineStats::new());
        let emitter = DualSinkEmitter::from_config(&cfg.sink, Arc::clone(&stats)).await;

        Self::assemble(cfg, store, emitter, stats).await
    }

    /// Starts an engine over caller-supplied collaborators.
    pub async fn with_parts<S, C>(cfg: Config, store: Option<S>, channel: Option<C>) -> Result<Self>
    where
        S: FrameStore,
        C: AnalyticalSinkChannel,
    {
        cfg.validate()?;

        let stats = Arc::new(EngineStats::new());
        let emitter = DualSinkEmitter::connect(&cfg.sink, channel, Arc::clone(&stats)).await;

        Self::assemble(cfg, store, emitter, stats).await
    }

    async fn assemble<S, C>(
        cfg: Config,
        store: Option<S>,
        emitter: DualSinkEmitter<C>,
        stats: Arc<EngineStats>,
    ) -> Result<Self>
    where
        S: FrameStore,
        C: AnalyticalSinkChannel,
    {
        let session_id = cfg.resolve_session_id();
        let persistence = store.is_some();
        let sink_mode = emitter.mode();
        let native_active = emitter.native_active();

        let state = Arc::new(IngestState::new(
            &cfg.ingest,
            session_id.clone(),
            emitter.wants_rows(),
            Arc::clone(&stats),
        ));

        let core = BatchWriter::new(
            store,
            session_id.clone(),
            BatchSettings::from_config(&cfg.writer, cfg.ttl()),
            stats,
        );

        let cancel = CancellationToken::new();
        let writer = AsyncPersistenceWriter::new(
            Arc::clone(&state),
            core,
            Arc::new(emitter),
            &cfg.writer,
        )
        .spawn(cancel.clone());

        let (health, health_addr) = if cfg.health.enabled {
            let health = Arc::new(
                HealthMetrics::new(&cfg.health.addr).context("creating health metrics")?,
            );
            health.sink_native_active.set(i64::from(native_active));
            let addr = match health.start(Arc::clone(&state)).await {
                Ok(addr) => addr,
                Err(e) => {
                    cancel.cancel();
                    // Writer already told to stop; its result adds nothing here.
                    let _ = writer.await;
                    return Err(e).context("starting health metrics server");
                }
            };
            (Some(health), Some(addr))
        } else {
            (None, None)
        };

        let reporter = spawn_stats_reporter(
            Arc::clone(&state),
            health.clone(),
            cancel.clone(),
            REPORT_INTERVAL,
        );

        info!(
            session_id = %session_id,
            persistence,
            sink_mode = %sink_mode,
            native_sink = native_active,
            "seqmem engine started",
        );

        Ok(Self {
            recorder: Recorder { state },
            health,
            health_addr,
            cancel,
            writer: Some(writer),
            reporter: Some(reporter),
        })
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Bound address of the health server, when enabled.
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health_addr
    }

    /// Stops background tasks. The writer flushes one last batch first;
    /// anything still queued after that is lost.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                error!(error = %e, "persistence writer task failed");
            }
        }

        if let Some(reporter) = self.reporter.take() {
            if let Err(e) = reporter.await {
                error!(error = %e, "stats reporter task failed");
            }
        }

        if let Some(health) = &self.health {
            health.stop().await?;
        }

        let stats = self.recorder.state.stats().snapshot();
        info!(
            recorded = stats.recorded,
            persisted = stats.frames_persisted,
            pending = self.recorder.state.pending_len(),
            "seqmem engine stopped",
        );

        Ok(())
    }
}

/// Logs counter growth every `period` and mirrors it into Prometheus.
fn spawn_stats_reporter(
    state: Arc<IngestState>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately.
        ticker.tick().await;

        let mut last = state.stats().snapshot();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Some(health) = &health {
                        health.observe(&state);
                    }

                    let current = state.stats().snapshot();
                    let delta = current.delta(&last);
                    last = current;

                    if delta.is_zero() {
                        continue;
                    }

                    info!(
                        recorded = delta.recorded,
                        persisted = delta.frames_persisted,
                        suppressed = delta.dedup_suppressed,
                        dropped = delta.queue_dropped + delta.frames_dropped,
                        pending = state.pending_len(),
                        "engine stats (60s)",
                    );

                    for (name, count) in delta.fields() {
                        if count > 0 {
                            debug!(counter = name, count, "  by counter (60s)");
                        }
                    }
                }
            }
        }
    })
}
