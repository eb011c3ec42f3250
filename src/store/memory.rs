use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{FrameId, FrameMetadata, FrameStatus, FrameStore, FrameSummary, StoreError};

/// A frame as held by [`MemoryFrameStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    pub id: FrameId,
    pub content: Vec<u8>,
    pub metadata: FrameMetadata,
    pub timestamp_ms: u64,
    pub status: FrameStatus,
    pub committed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    frames: BTreeMap<FrameId, StoredFrame>,
    next_id: FrameId,
    commits: u64,
    failing: bool,
    put_delay: Option<Duration>,
}

/// In-process frame store.
///
/// Clones share the same frames, so a handle kept outside the writer can
/// inspect what was persisted. Writes can be made to fail or stall.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames in id order.
    pub fn frames(&self) -> Vec<StoredFrame> {
        self.inner.lock().frames.values().cloned().collect()
    }

    pub fn frame(&self, id: FrameId) -> Option<StoredFrame> {
        self.inner.lock().frames.get(&id).cloned()
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    /// Makes every subsequent write return [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Sleeps this long inside each `put`, outside the store lock.
    pub fn set_put_delay(&self, delay: Option<Duration>) {
        self.inner.lock().put_delay = delay;
    }

    fn check_available(inner: &Inner) -> Result<(), StoreError> {
        if inner.failing {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl FrameStore for MemoryFrameStore {
    fn put(
        &mut self,
        content: &[u8],
        metadata: &FrameMetadata,
        timestamp_ms: u64,
    ) -> Result<FrameId, StoreError> {
        let delay = self.inner.lock().put_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;

        inner.next_id += 1;
        let id = inner.next_id;
        inner.frames.insert(
            id,
            StoredFrame {
                id,
                content: content.to_vec(),
                metadata: metadata.clone(),
                timestamp_ms,
                status: FrameStatus::Active,
                committed: false,
            },
        );
        Ok(id)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        for frame in inner.frames.values_mut() {
            frame.committed = true;
        }
        inner.commits += 1;
        Ok(())
    }

    fn delete(&mut self, id: FrameId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        match inner.frames.get_mut(&id) {
            Some(frame) => {
                frame.status = FrameStatus::Deleted;
                Ok(())
            }
            None => Err(StoreError::UnknownFrame { id }),
        }
    }

    fn list_frame_metadata(&self) -> Result<Vec<FrameSummary>, StoreError> {
        let inner = self.inner.lock();
        Self::check_available(&inner)?;
        Ok(inner
            .frames
            .values()
            .map(|f| FrameSummary {
                id: f.id,
                kind: f.metadata.kind.clone(),
                status: f.status,
                timestamp_ms: f.timestamp_ms,
            })
            .collect())
    }
}
