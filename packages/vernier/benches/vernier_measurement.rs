//! Benchmarking the measurement path of the meters.

#![expect(missing_docs, reason = "benchmarks do not require API documentation")]

use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use vernier::{MeterRegistry, Tags, Timer};

criterion_group!(benches, measurement, registration);
criterion_main!(benches);

fn measurement(c: &mut Criterion) {
    let registry = MeterRegistry::new();

    let counter = registry.counter("bench.counter", Tags::empty());
    let timer = registry.timer("bench.timer", Tags::empty());
    let histogram_timer = Timer::builder("bench.timer.histogram")
        .buckets(&[
            Duration::from_millis(1),
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::from_secs(1),
        ])
        .register(&registry);
    let summary = registry.summary("bench.summary", Tags::empty());
    let long_task_timer = registry.long_task_timer("bench.long_task", Tags::empty());

    let mut group = c.benchmark_group("vernier_measurement");

    group.bench_function("counter_increment", |b| {
        b.iter(|| counter.increment());
    });

    group.bench_function("timer_record", |b| {
        b.iter(|| timer.record(black_box(Duration::from_micros(250))));
    });

    group.bench_function("timer_record_histogram", |b| {
        b.iter(|| histogram_timer.record(black_box(Duration::from_micros(250))));
    });

    group.bench_function("summary_record", |b| {
        b.iter(|| summary.record(black_box(1024.0)));
    });

    group.bench_function("long_task_start_stop", |b| {
        b.iter(|| long_task_timer.start().stop());
    });

    group.finish();
}

fn registration(c: &mut Criterion) {
    let registry = MeterRegistry::new();
    let tags = Tags::of([("route", "/users"), ("method", "GET")]);

    // Warm up so the benchmark measures the lookup of an existing meter.
    _ = registry.counter("bench.lookup", tags.clone());

    let mut group = c.benchmark_group("vernier_registration");

    group.bench_function("counter_lookup_existing", |b| {
        b.iter(|| black_box(registry.counter("bench.lookup", tags.clone())));
    });

    group.bench_function("meters_snapshot", |b| {
        b.iter(|| black_box(registry.meters()));
    });

    group.finish();
}
