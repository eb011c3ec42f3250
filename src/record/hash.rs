use std::fmt;

use sha2::{Digest, Sha256};

use super::codec::Event;

const CONTENT_TAG: &[u8] = b"seqmem.content.v1";
const EVENT_TAG: &[u8] = b"seqmem.event.v1";

/// Digest of `(name, subject, ok)`. Timestamps are excluded so repeats of
/// the same event collapse during deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub u64);

impl ContentHash {
    pub fn of(event: &Event<'_>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(CONTENT_TAG);
        update_field(&mut hasher, event.name.as_bytes());
        match event.subject {
            Some(subject) => {
                hasher.update([1u8]);
                update_field(&mut hasher, subject.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update([u8::from(event.ok)]);

        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(head))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Stable identifier of one persisted occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub [u8; 16]);

impl EventId {
    pub fn of(content: ContentHash, event: &Event<'_>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(EVENT_TAG);
        hasher.update(content.0.to_le_bytes());
        hasher.update(event.timestamp_ms.to_le_bytes());
        hasher.update(event.duration_us.to_le_bytes());
        hasher.update([u8::from(event.ok)]);

        let digest = hasher.finalize();
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        Self(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
