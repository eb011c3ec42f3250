//! Read-only JSON views over the in-memory ingest state. Never touches the
//! frame store.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ingest::aggregate::LatencySnapshot;
use crate::ingest::stats::StatsSnapshot;
use crate::ingest::IngestState;
use crate::record::{decode, Record};

/// Returned in place of a document when the engine is gone.
pub const UNAVAILABLE_JSON: &str = r#"{"error":"seqmem_unavailable"}"#;

#[derive(Debug, Serialize)]
pub struct MetricsDoc<'a> {
    pub uptime_ms: u64,
    pub session_id: &'a str,
    pub counts: BTreeMap<String, u64>,
    pub latencies: BTreeMap<String, LatencySnapshot>,
    pub engine: EngineDoc,
}

#[derive(Debug, Serialize)]
pub struct EngineDoc {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub pending: usize,
}

#[derive(Debug, Serialize)]
pub struct TailDoc {
    pub count: usize,
    pub events: Vec<TailEntry>,
}

/// One tail entry: the decoded record or a placeholder carrying its size.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TailEntry {
    Event {
        name: String,
        ts_ms: u64,
        dur_us: u64,
        ok: bool,
        subject: Option<String>,
    },
    Undecodable {
        decode_error: bool,
        len: usize,
    },
}

impl TailEntry {
    fn from_raw(raw: &[u8]) -> Self {
        match decode(raw) {
            Some(Record {
                name,
                timestamp_ms,
                duration_us,
                ok,
                subject,
            }) => Self::Event {
                name,
                ts_ms: timestamp_ms,
                dur_us: duration_us,
                ok,
                subject,
            },
            None => Self::Undecodable {
                decode_error: true,
                len: raw.len(),
            },
        }
    }
}

pub fn metrics(state: &IngestState) -> MetricsDoc<'_> {
    let aggregates = state.aggregates();
    MetricsDoc {
        uptime_ms: u64::try_from(state.uptime().as_millis()).unwrap_or(u64::MAX),
        session_id: state.session_id(),
        counts: aggregates.counts,
        latencies: aggregates.latencies,
        engine: EngineDoc {
            counters: state.stats().snapshot(),
            pending: state.pending_len(),
        },
    }
}

/// Newest `max_events` records, oldest first. Negative values mean zero.
pub fn tail(state: &IngestState, max_events: i32) -> TailDoc {
    let max = usize::try_from(max_events).unwrap_or(0);
    let events: Vec<TailEntry> = state
        .tail_snapshot(max)
        .iter()
        .map(|raw| TailEntry::from_raw(raw))
        .collect();
    TailDoc {
        count: events.len(),
        events,
    }
}

pub fn metrics_json(state: &IngestState) -> String {
    serde_json::to_string(&metrics(state)).unwrap_or_else(|_| UNAVAILABLE_JSON.to_string())
}

pub fn tail_json(state: &IngestState, max_events: i32) -> String {
    serde_json::to_string(&tail(state, max_events)).unwrap_or_else(|_| UNAVAILABLE_JSON.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::config::IngestConfig;
    use crate::ingest::stats::EngineStats;
    use crate::record::Event;

    fn state() -> IngestState {
        IngestState::new(
            &IngestConfig::default(),
            "sess-1".into(),
            false,
            Arc::new(EngineStats::new()),
        )
    }

    #[test]
    fn test_metrics_json_shape() {
        let st = state();
        st.record(&Event::new("x", 1000, 50, true, Some("s")));
        st.record(&Event::new("x", 1100, 150, true, Some("s")));
        st.record(&Event::new("a", 1200, 10, false, None));

        let doc: Value = serde_json::from_str(&metrics_json(&st)).expect("json");
        assert_eq!(doc["session_id"], "sess-1");
        assert!(doc["uptime_ms"].is_u64());
        assert_eq!(doc["counts"]["x"], 2);
        assert_eq!(doc["counts"]["a"], 1);
        assert_eq!(doc["latencies"]["x"]["count"], 2);
        assert_eq!(doc["latencies"]["x"]["sum_us"], 200);
        assert_eq!(doc["latencies"]["x"]["avg_us"], 100);
        assert_eq!(doc["latencies"]["x"]["max_us"], 150);
        assert_eq!(doc["engine"]["recorded"], 3);
        assert_eq!(doc["engine"]["dedup_suppressed"], 1);
        assert_eq!(doc["engine"]["pending"], 2);

        // Keys come out sorted.
        let keys: Vec<_> = doc["counts"].as_object().expect("obj").keys().cloned().collect();
        assert_eq!(keys, vec!["a", "x"]);
    }

    #[test]
    fn test_tail_json_order_and_clamp() {
        let st = state();
        for (i, name) in ["first", "second", "third"].iter().enumerate() {
            st.record(&Event::new(name, i as u64, 1, true, None));
        }

        let doc: Value = serde_json::from_str(&tail_json(&st, 2)).expect("json");
        assert_eq!(doc["count"], 2);
        assert_eq!(doc["events"][0]["name"], "second");
        assert_eq!(doc["events"][1]["name"], "third");
        assert_eq!(doc["events"][1]["subject"], Value::Null);

        let doc: Value = serde_json::from_str(&tail_json(&st, -5)).expect("json");
        assert_eq!(doc["count"], 0);
        assert_eq!(doc["events"].as_array().map(Vec::len), Some(0));

        let doc: Value = serde_json::from_str(&tail_json(&st, 1000)).expect("json");
        assert_eq!(doc["count"], 3);
    }

    #[test]
    fn test_undecodable_entry_carries_length() {
        let entry = TailEntry::from_raw(b"not a record");
        let json = serde_json::to_value(&entry).expect("json");
        assert_eq!(json, serde_json::json!({"decode_error": true, "len": 12}));
    }
}
