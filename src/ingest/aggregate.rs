use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Running count/sum/max for one event name.
/// No histogram or percentiles are kept; updates stay O(1).
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyAggregate {
    count: u64,
    sum_us: u64,
    max_us: u64,
}

impl LatencyAggregate {
    /// Records a duration in microseconds.
    pub fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.sum_us = self.sum_us.saturating_add(duration_us);
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    /// Returns a point-in-time summary with the derived average.
    pub fn snapshot(&self) -> LatencySnapshot {
        let avg_us = if self.count == 0 {
            0
        } else {
            self.sum_us / self.count
        };

        LatencySnapshot {
            count: self.count,
            sum_us: self.sum_us,
            avg_us,
            max_us: self.max_us,
        }
    }
}

/// Point-in-time view of latency statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub sum_us: u64,
    pub avg_us: u64,
    pub max_us: u64,
}

/// Per-name counters and latency aggregates.
///
/// Entries are never removed. The first observation of a name allocates
/// its key; later observations of the same name do not allocate.
#[derive(Debug, Default)]
pub struct Aggregator {
    counts: HashMap<String, u64>,
    latencies: HashMap<String, LatencyAggregate>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, name: &str, duration_us: u64) {
        match self.counts.get_mut(name) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(name.to_string(), 1);
            }
        }

        match self.latencies.get_mut(name) {
            Some(agg) => agg.record(duration_us),
            None => {
                let mut agg = LatencyAggregate::default();
                agg.record(duration_us);
                self.latencies.insert(name.to_string(), agg);
            }
        }
    }

    /// Number of distinct names observed.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Copies all entries out, sorted by name.
    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            counts: self
                .counts
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
            latencies: self
                .latencies
                .iter()
                .map(|(name, agg)| (name.clone(), agg.snapshot()))
                .collect(),
        }
    }
}

/// Sorted copy of the aggregator state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSnapshot {
    pub counts: BTreeMap<String, u64>,
    pub latencies: BTreeMap<String, LatencySnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_aggregate_empty() {
        let snap = LatencyAggregate::default().snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.avg_us, 0);
        assert_eq!(snap.max_us, 0);
    }

    #[test]
    fn test_avg_is_integer_division_and_max_tracked() {
        let mut agg = Aggregator::new();
        let durations = [10u64, 25, 7, 100, 3];
        for d in durations {
            agg.observe("rpc", d);
        }

        let snap = agg.snapshot();
        let lat = snap.latencies["rpc"];
        assert_eq!(lat.count, 5);
        assert_eq!(lat.sum_us, 145);
        assert_eq!(lat.avg_us, 145 / 5);
        assert_eq!(lat.max_us, 100);
        assert_eq!(snap.counts["rpc"], 5);
    }

    #[test]
    fn test_names_are_independent() {
        let mut agg = Aggregator::new();
        agg.observe("a", 1);
        agg.observe("b", 9);
        agg.observe("a", 3);

        let snap = agg.snapshot();
        assert_eq!(snap.counts.len(), 2);
        assert_eq!(snap.counts["a"], 2);
        assert_eq!(snap.counts["b"], 1);
        assert_eq!(snap.latencies["a"].avg_us, 2);
        assert_eq!(snap.latencies["b"].max_us, 9);
    }

    #[test]
    fn test_sum_saturates() {
        let mut agg = LatencyAggregate::default();
        agg.record(u64::MAX);
        agg.record(5);
        let snap = agg.snapshot();
        assert_eq!(snap.sum_us, u64::MAX);
        assert_eq!(snap.max_us, u64::MAX);
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let mut agg = Aggregator::new();
        for name in ["zeta", "alpha", "mid"] {
            agg.observe(name, 1);
        }
        let names: Vec<_> = agg.snapshot().counts.into_keys().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
