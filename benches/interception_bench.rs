// benches/interception_bench.rs
//! Hot-path benchmarks: fingerprint computation and cache operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reqguard_engine::cache::{CacheEntry, CacheManager, MemoryStore};
use reqguard_engine::resolver::{canonical_key, classify, normalize_url};
use reqguard_engine::utils::config::CacheSettings;
use serde_json::json;
use std::sync::Arc;

fn bench_canonical_key(c: &mut Criterion) {
    let params = json!({
        "page": 3,
        "sort": "created_at",
        "filters": {"status": "active", "tags": ["a", "b", "c"]},
    });

    c.bench_function("canonical_key_with_params", |b| {
        b.iter(|| {
            canonical_key(
                black_box("https://api.example.com/v1/items?t=1699999999&page=3"),
                black_box(Some(&params)),
                black_box("POST"),
            )
        })
    });

    c.bench_function("canonical_key_url_only", |b| {
        b.iter(|| {
            canonical_key(
                black_box("https://api.example.com/v1/items?y=2&x=1&t=42"),
                None,
                black_box("GET"),
            )
        })
    });

    c.bench_function("normalize_url", |b| {
        b.iter(|| normalize_url(black_box("https://a/b?y=2&x=1&t=42&_=9&page=3")))
    });
}

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify", |b| {
        b.iter(|| classify(black_box(503), black_box(true)))
    });
}

fn bench_cache_ops(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let _guard = runtime.enter();

    let cache = CacheManager::new(
        "https://bench",
        Arc::new(MemoryStore::default()) as _,
        CacheSettings::default(),
    );
    for i in 0..200 {
        cache.set(
            format!("key-{:03}", i),
            CacheEntry::new(json!({"value": i}), None),
        );
    }

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| cache.get(black_box("key-100")))
    });

    c.bench_function("cache_set_overwrite", |b| {
        b.iter(|| {
            cache.set(
                black_box("key-100"),
                CacheEntry::new(json!({"value": 0}), None),
            )
        })
    });
}

criterion_group!(benches, bench_canonical_key, bench_classify, bench_cache_ops);
criterion_main!(benches);
