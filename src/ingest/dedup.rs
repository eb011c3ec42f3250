use std::collections::HashMap;

use crate::record::ContentHash;

#[derive(Debug, Clone, Copy)]
struct DedupSlot {
    hash: ContentHash,
    timestamp_ms: u64,
}

/// Fixed-capacity suppression window keyed by content hash.
///
/// Slots form a ring; the map holds the newest timestamp per hash. The map
/// never outgrows the ring because overwriting a slot drops its mapping,
/// unless the mapping has since moved on to a newer occurrence.
pub struct DedupRing {
    slots: Vec<Option<DedupSlot>>,
    next: usize,
    last_seen: HashMap<ContentHash, u64>,
}

impl DedupRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next: 0,
            last_seen: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live mappings.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// Returns false when the same hash was seen within `window_ms`,
    /// otherwise remembers this occurrence and returns true.
    ///
    /// Distance is `timestamp_ms - last` with wrapping subtraction, so an
    /// out-of-order timestamp reads as far away and persists.
    pub fn should_persist(&mut self, hash: ContentHash, timestamp_ms: u64, window_ms: u64) -> bool {
        if window_ms == 0 || self.slots.is_empty() {
            return true;
        }

        if let Some(&last) = self.last_seen.get(&hash) {
            if timestamp_ms.wrapping_sub(last) <= window_ms {
                return false;
            }
        }

        if let Some(evicted) = self.slots[self.next].take() {
            if self.last_seen.get(&evicted.hash) == Some(&evicted.timestamp_ms) {
                self.last_seen.remove(&evicted.hash);
            }
        }

        self.slots[self.next] = Some(DedupSlot { hash, timestamp_ms });
        self.last_seen.insert(hash, timestamp_ms);
        self.next = (self.next + 1) % self.slots.len();

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u64 = 250;

    #[test]
    fn test_repeat_inside_window_suppressed() {
        let mut ring = DedupRing::new(16);
        let h = ContentHash(7);
        assert!(ring.should_persist(h, 0, W));
        assert!(!ring.should_persist(h, 100, W));
    }

    #[test]
    fn test_repeat_outside_window_persists() {
        let mut ring = DedupRing::new(16);
        let h = ContentHash(7);
        assert!(ring.should_persist(h, 0, W));
        assert!(ring.should_persist(h, 300, W));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut ring = DedupRing::new(16);
        let h = ContentHash(1);
        assert!(ring.should_persist(h, 1_000, W));
        assert!(!ring.should_persist(h, 1_250, W));
        assert!(ring.should_persist(h, 1_251, W));
    }

    #[test]
    fn test_suppressed_repeat_does_not_extend_window() {
        let mut ring = DedupRing::new(16);
        let h = ContentHash(1);
        assert!(ring.should_persist(h, 0, W));
        assert!(!ring.should_persist(h, 200, W));
        // Measured from t=0, not from the suppressed t=200.
        assert!(ring.should_persist(h, 260, W));
    }

    #[test]
    fn test_zero_window_disables() {
        let mut ring = DedupRing::new(16);
        let h = ContentHash(1);
        assert!(ring.should_persist(h, 0, 0));
        assert!(ring.should_persist(h, 0, 0));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut ring = DedupRing::new(0);
        let h = ContentHash(1);
        assert!(ring.should_persist(h, 0, W));
        assert!(ring.should_persist(h, 1, W));
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn test_distinct_hashes_never_exceed_capacity() {
        let capacity = 8;
        let mut ring = DedupRing::new(capacity);
        for i in 0..=capacity as u64 {
            assert!(ring.should_persist(ContentHash(i), 10, W));
            assert!(ring.len() <= capacity);
        }
        assert_eq!(ring.len(), capacity);
        // The oldest hash was evicted and persists again.
        assert!(ring.should_persist(ContentHash(0), 11, W));
    }

    #[test]
    fn test_stale_slot_does_not_evict_newer_mapping() {
        let mut ring = DedupRing::new(2);
        let h = ContentHash(42);
        assert!(ring.should_persist(h, 0, W)); // slot 0
        assert!(ring.should_persist(h, 1_000, W)); // slot 1, mapping -> 1000
        // Overwrites slot 0, which still names h at t=0; mapping must survive.
        assert!(ring.should_persist(ContentHash(9), 1_001, W));
        assert!(!ring.should_persist(h, 1_100, W));
        assert!(ring.len() <= ring.capacity());
    }

    #[test]
    fn test_out_of_order_timestamp_persists() {
        let mut ring = DedupRing::new(4);
        let h = ContentHash(3);
        assert!(ring.should_persist(h, 10_000, W));
        assert!(ring.should_persist(h, 9_900, W));
    }

    #[test]
    fn test_long_run_bounded() {
        let mut ring = DedupRing::new(64);
        for i in 0..10_000u64 {
            ring.should_persist(ContentHash(i % 97), i * 3, W);
            assert!(ring.len() <= 64);
        }
    }
}
