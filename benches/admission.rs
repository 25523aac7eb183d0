// Admission path benchmarks
//
// Measures the cost of the quota check around a unit of work:
// - raw store reservation
// - a full execute_request with pacing disabled
//
// Usage:
//   cargo bench --bench admission

use criterion::{criterion_group, criterion_main, Criterion};
use quota_guard::rate_limit::{
    MemoryQuotaStore, PlatformQuota, QuotaStore, RateLimitConfig, RateLimitingService, TrackerKey,
};
use std::hint::black_box;
use std::sync::Arc;

fn bench_admission(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime for benchmark");

    let store = Arc::new(MemoryQuotaStore::new());
    let key = TrackerKey::new("bench", "items", "bench-customer");
    rt.block_on(store.find_or_create(&key, u64::MAX, 3600))
        .expect("Failed to create benchmark tracker");

    c.bench_function("store_reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = store
                    .reserve(&key, 1)
                    .await
                    .expect("Reservation failed during benchmark");
                store
                    .release(&key, 1, reservation.tracker().reset_at)
                    .await
                    .expect("Release failed during benchmark");
                black_box(reservation);
            });
        });
    });

    let config = RateLimitConfig::without_pacing()
        .with_platform("bench", PlatformQuota::new(u64::MAX, 3600));
    let service = rt
        .block_on(RateLimitingService::new(store.clone(), &config, key.clone()))
        .expect("Failed to create benchmark service");

    c.bench_function("execute_request_unpaced", |b| {
        b.iter(|| {
            let value = rt
                .block_on(service.execute_request(|| async { Ok(black_box(42u32)) }))
                .expect("Request failed during benchmark");
            black_box(value);
        });
    });
}

criterion_group!(benches, bench_admission);
criterion_main!(benches);
