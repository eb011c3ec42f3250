use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WriterConfig;
use crate::ingest::stats::EngineStats;
use crate::ingest::PendingFrame;
use crate::store::{FrameId, FrameKind, FrameMetadata, FrameStatus, FrameStore, StoreError};

/// Settings for one [`BatchWriter`].
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub commit_interval: Duration,
    pub maintenance_interval: Duration,
    /// `None` disables maintenance.
    pub ttl: Option<Duration>,
    pub max_deletes_per_pass: usize,
}

impl BatchSettings {
    pub fn from_config(cfg: &WriterConfig, ttl: Option<Duration>) -> Self {
        Self {
            commit_interval: cfg.commit_interval,
            maintenance_interval: cfg.maintenance_interval,
            ttl,
            max_deletes_per_pass: cfg.max_deletes_per_pass,
        }
    }
}

/// Content of the session root frame.
#[derive(Debug, Serialize)]
struct SessionInfo<'a> {
    session_id: &'a str,
    started_ms: u64,
    pid: u32,
    version: &'static str,
}

/// Synchronous flush core owned by the persistence task.
///
/// Sole owner of the frame store and the session root id. All methods do
/// blocking I/O and run on the blocking pool. Errors are counted, logged and
/// dropped; a failed batch is lost.
pub struct BatchWriter<S> {
    store: Option<S>,
    session_id: String,
    root: Option<FrameId>,
    settings: BatchSettings,
    stats: Arc<EngineStats>,
    last_commit: Instant,
    last_maintenance: Option<Instant>,
    dirty: bool,
}

impl<S: FrameStore> BatchWriter<S> {
    /// `store` of `None` runs with persistence disabled: drained frames are
    /// counted as dropped.
    pub fn new(
        store: Option<S>,
        session_id: String,
        settings: BatchSettings,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            store,
            session_id,
            root: None,
            settings,
            stats,
            last_commit: Instant::now(),
            last_maintenance: None,
            dirty: false,
        }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Session root frame id, once created.
    pub fn session_root(&self) -> Option<FrameId> {
        self.root
    }

    /// True when a cycle at `now` would touch the store.
    pub fn needs_io(&self, now: Instant, has_frames: bool) -> bool {
        if has_frames {
            return true;
        }
        if self.store.is_none() {
            return false;
        }
        self.commit_due(now) || self.maintenance_due(now)
    }

    /// Writes one batch, linking every frame to the session root.
    pub fn flush(&mut self, frames: Vec<PendingFrame>, now: Instant, now_ms: u64) {
        if frames.is_empty() {
            self.maybe_commit(now);
            return;
        }
        let count = frames.len() as u64;

        if self.store.is_none() {
            EngineStats::add(&self.stats.frames_dropped, count);
            return;
        }

        let root = match self.ensure_root(now_ms) {
            Ok(root) => root,
            Err(e) => {
                EngineStats::incr(&self.stats.flush_errors);
                EngineStats::add(&self.stats.frames_dropped, count);
                warn!(error = %e, frames = count, "creating session root failed, dropping batch");
                return;
            }
        };

        let mut contents = Vec::with_capacity(frames.len());
        let mut metadata = Vec::with_capacity(frames.len());
        let mut timestamps = Vec::with_capacity(frames.len());
        for frame in frames {
            let mut meta = frame.metadata;
            meta.parent.get_or_insert(root);
            contents.push(frame.content);
            metadata.push(meta);
            timestamps.push(frame.timestamp_ms);
        }
        let slices: Vec<&[u8]> = contents.iter().map(Vec::as_slice).collect();

        let Some(store) = self.store.as_mut() else {
            return;
        };
        match store.put_batch(&slices, &metadata, &timestamps) {
            Ok(ids) => {
                EngineStats::add(&self.stats.frames_persisted, ids.len() as u64);
                self.dirty = true;
            }
            Err(e) => {
                EngineStats::incr(&self.stats.flush_errors);
                EngineStats::add(&self.stats.frames_dropped, count);
                warn!(error = %e, frames = count, "frame batch write failed, dropping batch");
            }
        }

        self.maybe_commit(now);
    }

    /// Commits if writes are pending and the commit interval has passed.
    pub fn maybe_commit(&mut self, now: Instant) {
        if self.commit_due(now) {
            self.commit(now);
        }
    }

    /// Commits any pending writes regardless of the interval.
    pub fn commit_now(&mut self, now: Instant) {
        if self.dirty {
            self.commit(now);
        }
    }

    /// Deletes expired frames, at most once per maintenance interval.
    pub fn maintain(&mut self, now: Instant, now_ms: u64) {
        if !self.maintenance_due(now) {
            return;
        }
        self.last_maintenance = Some(now);

        let Some(ttl) = self.settings.ttl else {
            return;
        };
        let Some(store) = self.store.as_mut() else {
            return;
        };

        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now_ms.saturating_sub(ttl_ms);

        let frames = match store.list_frame_metadata() {
            Ok(frames) => frames,
            Err(e) => {
                EngineStats::incr(&self.stats.flush_errors);
                warn!(error = %e, "listing frames for maintenance failed");
                return;
            }
        };

        let mut deleted = 0u64;
        for frame in frames {
            if deleted as usize >= self.settings.max_deletes_per_pass {
                break;
            }
            if frame.status != FrameStatus::Active
                || frame.timestamp_ms >= cutoff
                || FrameKind::from_name(&frame.kind).is_none()
                || Some(frame.id) == self.root
            {
                continue;
            }

            match store.delete(frame.id) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    EngineStats::incr(&self.stats.flush_errors);
                    debug!(frame = frame.id, error = %e, "deleting expired frame failed");
                }
            }
        }

        if deleted > 0 {
            self.dirty = true;
            self.commit(now);
            EngineStats::add(&self.stats.frames_expired, deleted);
            info!(deleted, cutoff_ms = cutoff, "expired old frames");
        }
    }

    fn commit_due(&self, now: Instant) -> bool {
        self.dirty && now.saturating_duration_since(self.last_commit) > self.settings.commit_interval
    }

    fn maintenance_due(&self, now: Instant) -> bool {
        if self.settings.ttl.is_none() || self.store.is_none() {
            return false;
        }
        match self.last_maintenance {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.settings.maintenance_interval,
        }
    }

    fn commit(&mut self, now: Instant) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        match store.commit() {
            Ok(()) => {
                EngineStats::incr(&self.stats.commits);
                self.dirty = false;
                self.last_commit = now;
            }
            Err(e) => {
                EngineStats::incr(&self.stats.flush_errors);
                warn!(error = %e, "frame store commit failed");
            }
        }
    }

    /// Creates the session root on first use. Cached only once written.
    fn ensure_root(&mut self, now_ms: u64) -> Result<FrameId, StoreError> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        let Some(store) = self.store.as_mut() else {
            return Err(StoreError::Unavailable("persistence disabled".to_string()));
        };

        let info = SessionInfo {
            session_id: &self.session_id,
            started_ms: now_ms,
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION"),
        };
        let content = serde_json::to_vec(&info)?;
        let metadata = FrameMetadata::new(
            FrameKind::Session,
            format!("seqmem://session/{}", self.session_id),
        )
        .with_tag("session_id", self.session_id.as_str());

        let id = store.put(&content, &metadata, now_ms)?;
        self.dirty = true;
        self.root = Some(id);
        debug!(session_id = %self.session_id, frame = id, "created session root");
        Ok(id)
    }
}
