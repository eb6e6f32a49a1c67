use commute_stats::processor::statistics::{StatName, compute};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_battery(c: &mut Criterion) {
    let empty: Vec<f64> = Vec::new();
    let samples: Vec<f64> = (0..5_000).map(|i| ((i * 7919) % 3_600) as f64).collect();

    c.bench_function("full battery, 5000 samples", |b| {
        b.iter(|| compute(black_box(&samples), &StatName::ALL))
    });
    c.bench_function("empty fallback", |b| {
        b.iter(|| compute(black_box(&empty), &StatName::ALL))
    });
}

criterion_group!(benches, bench_battery);
criterion_main!(benches);
