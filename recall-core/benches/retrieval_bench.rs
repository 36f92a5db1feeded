//! Retrieval funnel benchmarks: ingest throughput and fused search latency.

use criterion::{criterion_group, criterion_main, Criterion};
use recall_core::{EngineConfig, MemoryEngine, RecordMetadata, ScopeId, SearchRequest};
use std::hint::black_box;

fn seeded_engine(records: usize) -> (tempfile::TempDir, MemoryEngine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");
    let scope = ScopeId::new("bench", "default", "run");
    for i in 0..records {
        engine
            .add_with_options(
                &format!("benchmark memory {i}: component {} tuning note {}", i % 17, i % 31),
                &scope,
                RecordMetadata::default(),
                recall_core::AddOptions {
                    skip_dedup: true,
                    skip_llm: true,
                },
            )
            .expect("seed add");
    }
    (dir, engine)
}

fn bench_ingest(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");
    let scope = ScopeId::new("bench", "default", "run");
    let mut i = 0u64;
    c.bench_function("ingest_single", |b| {
        b.iter(|| {
            i += 1;
            engine
                .add_with_options(
                    &format!("ingest bench record {i} with unique payload {}", i * 7919),
                    &scope,
                    RecordMetadata::default(),
                    recall_core::AddOptions {
                        skip_dedup: true,
                        skip_llm: true,
                    },
                )
                .expect("add")
        });
    });
}

fn bench_search(c: &mut Criterion) {
    let (_dir, engine) = seeded_engine(2_000);
    let scope = ScopeId::new("bench", "default", "run");
    c.bench_function("fused_search_top10", |b| {
        b.iter(|| {
            let hits = engine
                .search(&SearchRequest::new("component tuning note").in_scope(scope.clone()))
                .expect("search");
            black_box(hits)
        });
    });
}

criterion_group!(benches, bench_ingest, bench_search);
criterion_main!(benches);
