//! Rate limiter throughput benchmark.
//!
//! Measures admission checks against hot and spread-out scoped buckets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jeeves_plugin_runtime::runtime::{parse_rate, RateLimiter};

fn bench_parse_rate(c: &mut Criterion) {
    c.bench_function("parse_rate", |b| {
        b.iter(|| parse_rate(black_box("1200/minute")));
    });
}

fn bench_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let identity_counts: &[usize] = &[1, 100, 10_000];

    let mut group = c.benchmark_group("check");
    for &count in identity_counts {
        let identities: Vec<String> = (0..count).map(|i| format!("user-{}", i)).collect();
        // Large enough that nothing is ever rejected during a run.
        let limiter = RateLimiter::new("1000000000/second", "1000000000/second");
        let mut next = 0usize;

        group.bench_with_input(BenchmarkId::from_parameter(count), &identities, |b, ids| {
            b.iter(|| {
                let identity = &ids[next % ids.len()];
                next = next.wrapping_add(1);
                rt.block_on(async {
                    limiter
                        .check(black_box(identity), "quotes", "lookup")
                        .await
                        .unwrap()
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse_rate, bench_check);
criterion_main!(benches);
