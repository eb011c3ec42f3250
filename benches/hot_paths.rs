use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seqmem::config::IngestConfig;
use seqmem::ingest::dedup::DedupRing;
use seqmem::ingest::stats::EngineStats;
use seqmem::ingest::IngestState;
use seqmem::record::{decode, encode, encode_into, ContentHash, Event};

fn sample_event(ts: u64) -> Event<'static> {
    Event::new("http.request", ts, 2_500, true, Some("/api/v1/orders"))
}

fn bench_codec(c: &mut Criterion) {
    let ev = sample_event(1_700_000_000_000);
    let encoded = encode(&ev);
    let mut scratch = Vec::with_capacity(128);

    c.bench_function("codec/encode", |b| b.iter(|| encode(black_box(&ev))));

    c.bench_function("codec/encode_into_reused", |b| {
        b.iter(|| {
            encode_into(black_box(&ev), &mut scratch);
            black_box(scratch.len())
        })
    });

    c.bench_function("codec/decode", |b| {
        b.iter(|| decode(black_box(&encoded)).expect("decode"))
    });

    c.bench_function("codec/content_hash", |b| {
        b.iter(|| ContentHash::of(black_box(&ev)))
    });
}

fn bench_dedup(c: &mut Criterion) {
    let mut ring = DedupRing::new(4_096);
    let mut ts = 0u64;

    c.bench_function("dedup/should_persist_mixed", |b| {
        b.iter(|| {
            ts += 7;
            // Eight distinct hashes cycling inside and outside the window.
            black_box(ring.should_persist(ContentHash(ts % 8), ts, 250))
        })
    });
}

fn bench_record(c: &mut Criterion) {
    let cfg = IngestConfig::default();

    let suppressed = IngestState::new(
        &cfg,
        "bench".to_string(),
        true,
        Arc::new(EngineStats::new()),
    );
    let ev = sample_event(1_000);
    c.bench_function("ingest/record_suppressed", |b| {
        b.iter(|| suppressed.record(black_box(&ev)))
    });

    let persisted = IngestState::new(
        &cfg,
        "bench".to_string(),
        true,
        Arc::new(EngineStats::new()),
    );
    let mut ts = 0u64;
    c.bench_function("ingest/record_persisted", |b| {
        b.iter(|| {
            ts += 1_000;
            persisted.record(black_box(&sample_event(ts)));
            // Keep the queue below capacity so every call takes the enqueue path.
            if persisted.pending_len() >= 4_096 {
                black_box(persisted.drain(usize::MAX).len());
            }
        })
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_codec(c);
    bench_dedup(c);
    bench_record(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
