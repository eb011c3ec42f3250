//! Hot-path ingest: one lock over aggregates, dedup ring, tail ring and the
//! pending-write queue.

pub mod aggregate;
pub mod dedup;
pub mod stats;
pub mod tail;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::IngestConfig;
use crate::record::{encode_into, ContentHash, Event, EventId};
use crate::sink::SinkRow;
use crate::store::{FrameKind, FrameMetadata};

use self::aggregate::{AggregateSnapshot, Aggregator};
use self::dedup::DedupRing;
use self::stats::EngineStats;
use self::tail::TailRing;

/// One accepted event waiting for the persistence writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    /// Encoded record bytes.
    pub content: Vec<u8>,
    pub timestamp_ms: u64,
    pub metadata: FrameMetadata,
    /// Row for the analytical sink, when one is wanted.
    pub row: Option<SinkRow>,
}

struct Inner {
    aggregator: Aggregator,
    dedup: DedupRing,
    tail: TailRing,
    pending: VecDeque<PendingFrame>,
    scratch: Vec<u8>,
}

/// Shared state between callers, the writer and queries.
pub struct IngestState {
    inner: Mutex<Inner>,
    session_id: String,
    dedup_window_ms: u64,
    pending_capacity: usize,
    build_rows: bool,
    stats: Arc<EngineStats>,
    started: Instant,
}

impl IngestState {
    pub fn new(
        cfg: &IngestConfig,
        session_id: String,
        build_rows: bool,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                aggregator: Aggregator::new(),
                dedup: DedupRing::new(cfg.dedup_capacity),
                tail: TailRing::new(cfg.tail_capacity),
                pending: VecDeque::new(),
                scratch: Vec::with_capacity(256),
            }),
            session_id,
            dedup_window_ms: cfg.dedup_window_ms,
            pending_capacity: cfg.pending_capacity,
            build_rows,
            stats,
            started: Instant::now(),
        }
    }

    /// Records one event. Never blocks on I/O and never fails.
    ///
    /// An empty name is ignored and an empty subject counts as absent.
    pub fn record(&self, event: &Event<'_>) {
        if event.name.is_empty() {
            return;
        }
        let event = Event {
            subject: event.subject.filter(|s| !s.is_empty()),
            ..*event
        };

        let hash = ContentHash::of(&event);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.aggregator.observe(event.name, event.duration_us);
        EngineStats::incr(&self.stats.recorded);

        encode_into(&event, &mut inner.scratch);

        if inner
            .dedup
            .should_persist(hash, event.timestamp_ms, self.dedup_window_ms)
        {
            if inner.pending.len() < self.pending_capacity {
                let frame = self.build_frame(&event, hash, &inner.scratch);
                inner.pending.push_back(frame);
            } else {
                EngineStats::incr(&self.stats.queue_dropped);
            }
        } else {
            EngineStats::incr(&self.stats.dedup_suppressed);
        }

        inner.tail.push(&inner.scratch);
    }

    fn build_frame(&self, event: &Event<'_>, hash: ContentHash, content: &[u8]) -> PendingFrame {
        let event_id = EventId::of(hash, event).to_string();
        let content_hash = hash.to_string();

        let uri = format!("seqmem://session/{}/event/{}", self.session_id, event_id);
        let mut metadata = FrameMetadata::new(FrameKind::Event, uri)
            .with_tag("session_id", self.session_id.as_str())
            .with_tag("event_id", event_id.as_str())
            .with_tag("content_hash", content_hash.as_str())
            .with_tag("name", event.name);
        if let Some(subject) = event.subject {
            metadata = metadata.with_tag("subject", subject);
        }

        let row = self.build_rows.then(|| SinkRow {
            ts_ms: event.timestamp_ms,
            dur_us: event.duration_us,
            ok: event.ok,
            session_id: self.session_id.clone(),
            event_id,
            content_hash,
            name: event.name.to_string(),
            subject: event.subject.map(str::to_string),
        });

        PendingFrame {
            content: content.to_vec(),
            timestamp_ms: event.timestamp_ms,
            metadata,
            row,
        }
    }

    /// Takes up to `max` frames from the front of the queue.
    pub fn drain(&self, max: usize) -> Vec<PendingFrame> {
        let mut inner = self.inner.lock();
        if inner.pending.len() <= max {
            Vec::from(std::mem::take(&mut inner.pending))
        } else {
            inner.pending.drain(..max).collect()
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn aggregates(&self) -> AggregateSnapshot {
        self.inner.lock().aggregator.snapshot()
    }

    /// Copies up to `max_n` raw records, oldest first.
    pub fn tail_snapshot(&self, max_n: usize) -> Vec<Vec<u8>> {
        self.inner.lock().tail.snapshot(max_n)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }
}
