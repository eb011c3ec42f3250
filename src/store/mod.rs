//! Frame store contract consumed by the persistence writer.
//!
//! A frame is one durable unit: opaque content bytes, structured metadata and
//! a timestamp. Stores are append-only; deletion marks a frame inactive.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileFrameStore;
pub use memory::MemoryFrameStore;

/// Identifier assigned by the store on `put`.
pub type FrameId = u64;

/// Schema tag written into every frame's metadata.
pub const SCHEMA_VERSION: &str = "seqmem.v1";

/// Frame kinds written by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Session,
    Event,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "seqmem.session",
            Self::Event => "seqmem.event",
        }
    }

    /// Parses a stored kind; foreign kinds yield `None`.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "seqmem.session" => Some(Self::Session),
            "seqmem.event" => Some(Self::Event),
            _ => None,
        }
    }
}

/// Metadata stored alongside frame content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub kind: String,
    pub schema: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<FrameId>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl FrameMetadata {
    pub fn new(kind: FrameKind, uri: String) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            schema: SCHEMA_VERSION.to_string(),
            uri,
            parent: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn frame_kind(&self) -> Option<FrameKind> {
        FrameKind::from_name(&self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Active,
    Deleted,
}

/// One row of `list_frame_metadata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub id: FrameId,
    pub kind: String,
    pub status: FrameStatus,
    pub timestamp_ms: u64,
}

/// Errors returned by frame store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("frame store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding frame metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("corrupt frame log at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: &'static str },

    #[error("batch length mismatch: {contents} contents, {metadata} metadata, {timestamps} timestamps")]
    BatchMismatch {
        contents: usize,
        metadata: usize,
        timestamps: usize,
    },

    #[error("unknown frame {id}")]
    UnknownFrame { id: FrameId },

    #[error("frame store unavailable: {0}")]
    Unavailable(String),
}

/// Embedded append-only frame store.
pub trait FrameStore: Send + 'static {
    /// Appends one frame. Not durable until `commit`.
    fn put(
        &mut self,
        content: &[u8],
        metadata: &FrameMetadata,
        timestamp_ms: u64,
    ) -> Result<FrameId, StoreError>;

    /// Appends frames in order, returning their ids in the same order.
    fn put_batch(
        &mut self,
        contents: &[&[u8]],
        metadata: &[FrameMetadata],
        timestamps: &[u64],
    ) -> Result<Vec<FrameId>, StoreError> {
        check_batch(contents, metadata, timestamps)?;
        let mut ids = Vec::with_capacity(contents.len());
        for ((content, meta), ts) in contents.iter().zip(metadata).zip(timestamps) {
            ids.push(self.put(content, meta, *ts)?);
        }
        Ok(ids)
    }

    /// Makes all prior writes durable.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Marks a frame deleted. Deleting an already-deleted frame is a no-op.
    fn delete(&mut self, id: FrameId) -> Result<(), StoreError>;

    /// Lists every known frame, active or deleted, in id order.
    fn list_frame_metadata(&self) -> Result<Vec<FrameSummary>, StoreError>;
}

pub(crate) fn check_batch(
    contents: &[&[u8]],
    metadata: &[FrameMetadata],
    timestamps: &[u64],
) -> Result<(), StoreError> {
    if contents.len() != metadata.len() || contents.len() != timestamps.len() {
        return Err(StoreError::BatchMismatch {
            contents: contents.len(),
            metadata: metadata.len(),
            timestamps: timestamps.len(),
        });
    }
    Ok(())
}
