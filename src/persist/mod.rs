//! Background persistence: drains the ingest queue on a timer and writes
//! batches to the frame store while mirroring rows to the analytical sink.

pub mod batch;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::clock;
use crate::config::WriterConfig;
use crate::ingest::IngestState;
use crate::sink::{AnalyticalSinkChannel, DualSinkEmitter, NativeChannel, SinkRow};
use crate::store::FrameStore;

pub use batch::{BatchSettings, BatchWriter};

/// Single-writer persistence task.
///
/// Each tick drains at most `max_batch` frames, writes them on the blocking
/// pool and concurrently hands their rows to the emitter, which then replays
/// a bounded slice of its fallback queue. A busy writer only lets the
/// pending queue grow; callers are never made to wait.
pub struct AsyncPersistenceWriter<S, C = NativeChannel> {
    state: Arc<IngestState>,
    core: Option<BatchWriter<S>>,
    emitter: Arc<DualSinkEmitter<C>>,
    tick: Duration,
    max_batch: usize,
}

impl<S, C> AsyncPersistenceWriter<S, C>
where
    S: FrameStore,
    C: AnalyticalSinkChannel,
{
    pub fn new(
        state: Arc<IngestState>,
        core: BatchWriter<S>,
        emitter: Arc<DualSinkEmitter<C>>,
        cfg: &WriterConfig,
    ) -> Self {
        Self {
            state,
            core: Some(core),
            emitter,
            tick: cfg.tick,
            max_batch: cfg.max_batch.max(1),
        }
    }

    /// Starts the tick loop. On cancellation one last batch is flushed and
    /// committed before the task ends.
    pub fn spawn(self, ctx: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(ctx))
    }

    async fn run(mut self, ctx: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.run_cycle(true).await;
                    debug!("persistence writer stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if !self.run_cycle(false).await {
                        return;
                    }
                }
            }
        }
    }

    /// Runs one drain/flush/commit/maintenance cycle. `last` forces a
    /// commit and skips maintenance.
    ///
    /// Returns false once the flush core is gone.
    pub async fn run_cycle(&mut self, last: bool) -> bool {
        let Some(mut core) = self.core.take() else {
            return false;
        };

        let mut frames = self.state.drain(self.max_batch);
        let rows: Vec<SinkRow> = frames.iter_mut().filter_map(|f| f.row.take()).collect();

        let now = Instant::now();
        if !last && !core.needs_io(now, !frames.is_empty()) {
            self.core = Some(core);
            self.emitter.replay_fallback().await;
            return true;
        }

        let work = tokio::task::spawn_blocking(move || {
            let now_ms = clock::now_ms();
            core.flush(frames, now, now_ms);
            if last {
                core.commit_now(now);
            } else {
                core.maintain(now, now_ms);
            }
            core
        });

        let emitter = &self.emitter;
        let sink = async {
            emitter.emit(&rows).await;
            emitter.replay_fallback().await;
        };

        let (joined, ()) = tokio::join!(work, sink);

        match joined {
            Ok(core) => {
                self.core = Some(core);
                true
            }
            Err(e) => {
                error!(error = %e, "persistence flush task failed, writer stopping");
                false
            }
        }
    }

    /// Flush core, present while the writer is healthy.
    pub fn core(&self) -> Option<&BatchWriter<S>> {
        self.core.as_ref()
    }
}
