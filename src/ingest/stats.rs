use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free engine counters shared by the hot path and the writer.
///
/// Unlike the ingest state these are readable without taking the ingest
/// lock. `snapshot()` reads without resetting.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub recorded: AtomicU64,
    pub dedup_suppressed: AtomicU64,
    pub queue_dropped: AtomicU64,
    pub frames_persisted: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub flush_errors: AtomicU64,
    pub commits: AtomicU64,
    pub frames_expired: AtomicU64,
    pub sink_rows: AtomicU64,
    pub sink_errors: AtomicU64,
    pub sink_spooled: AtomicU64,
    pub sink_queued: AtomicU64,
    pub sink_replayed: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            recorded: self.recorded.load(Ordering::Relaxed),
            dedup_suppressed: self.dedup_suppressed.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            frames_persisted: self.frames_persisted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            flush_errors: self.flush_errors.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            frames_expired: self.frames_expired.load(Ordering::Relaxed),
            sink_rows: self.sink_rows.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            sink_spooled: self.sink_spooled.load(Ordering::Relaxed),
            sink_queued: self.sink_queued.load(Ordering::Relaxed),
            sink_replayed: self.sink_replayed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub recorded: u64,
    pub dedup_suppressed: u64,
    pub queue_dropped: u64,
    pub frames_persisted: u64,
    pub frames_dropped: u64,
    pub flush_errors: u64,
    pub commits: u64,
    pub frames_expired: u64,
    pub sink_rows: u64,
    pub sink_errors: u64,
    pub sink_spooled: u64,
    /// Rows written to the fallback queue after a native delivery failed.
    pub sink_queued: u64,
    /// Fallback rows later delivered through the native channel.
    pub sink_replayed: u64,
}

impl StatsSnapshot {
    /// Per-field growth since `earlier`.
    pub fn delta(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            recorded: self.recorded.saturating_sub(earlier.recorded),
            dedup_suppressed: self.dedup_suppressed.saturating_sub(earlier.dedup_suppressed),
            queue_dropped: self.queue_dropped.saturating_sub(earlier.queue_dropped),
            frames_persisted: self.frames_persisted.saturating_sub(earlier.frames_persisted),
            frames_dropped: self.frames_dropped.saturating_sub(earlier.frames_dropped),
            flush_errors: self.flush_errors.saturating_sub(earlier.flush_errors),
            commits: self.commits.saturating_sub(earlier.commits),
            frames_expired: self.frames_expired.saturating_sub(earlier.frames_expired),
            sink_rows: self.sink_rows.saturating_sub(earlier.sink_rows),
            sink_errors: self.sink_errors.saturating_sub(earlier.sink_errors),
            sink_spooled: self.sink_spooled.saturating_sub(earlier.sink_spooled),
            sink_queued: self.sink_queued.saturating_sub(earlier.sink_queued),
            sink_replayed: self.sink_replayed.saturating_sub(earlier.sink_replayed),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == StatsSnapshot::default()
    }

    /// Counters as `(name, value)` pairs, in declaration order.
    pub fn fields(&self) -> [(&'static str, u64); 13] {
        [
            ("recorded", self.recorded),
            ("dedup_suppressed", self.dedup_suppressed),
            ("queue_dropped", self.queue_dropped),
            ("frames_persisted", self.frames_persisted),
            ("frames_dropped", self.frames_dropped),
            ("flush_errors", self.flush_errors),
            ("commits", self.commits),
            ("frames_expired", self.frames_expired),
            ("sink_rows", self.sink_rows),
            ("sink_errors", self.sink_errors),
            ("sink_spooled", self.sink_spooled),
            ("sink_queued", self.sink_queued),
            ("sink_replayed", self.sink_replayed),
        ]
    }
}
