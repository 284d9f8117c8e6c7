//! Registers meters of every kind, applies filters and prints what an exporter would see.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use vernier::filter::{common_tags, deny_name_starts_with, rename_tag};
use vernier::naming::SnakeCase;
use vernier::{Gauge, Measurement, MeterRegistry, Statistic, Tags, TimeUnit};

#[expect(
    clippy::cast_precision_loss,
    reason = "demo values are far below 2^53"
)]
fn as_f64(value: u64) -> f64 {
    value as f64
}

fn main() {
    let registry = MeterRegistry::new();

    _ = registry
        .config()
        .add_filter(common_tags(Tags::of([("service", "checkout")])))
        .add_filter(rename_tag("http.", "uri", "path"))
        .add_filter(deny_name_starts_with("debug."))
        .set_naming_convention(Arc::new(SnakeCase::default()));

    let requests = registry.counter("http.requests", Tags::of([("uri", "/cart")]));
    requests.increment();
    requests.increment_by(4.0);

    let latency = registry.timer("http.latency", Tags::of([("uri", "/cart")]));
    latency.record(Duration::from_millis(12));
    latency.record(Duration::from_millis(30));

    let queue = Arc::new(AtomicU64::new(17));
    _ = Gauge::weak_builder("queue.depth", &queue, |q| {
        as_f64(q.load(Ordering::Relaxed))
    })
    .register(&registry);

    let processed = Arc::new(AtomicU64::new(250));
    _ = registry.function_counter("jobs.processed", Tags::empty(), &processed, |p| {
        as_f64(p.load(Ordering::Relaxed))
    });

    _ = registry.custom("cache.stats", Tags::empty(), || {
        vec![
            Measurement::new(Statistic::Count, 12.0),
            Measurement::new(Statistic::Value, 0.93),
        ]
    });

    // Denied by filter: works, records nothing, never published.
    registry.counter("debug.allocations", Tags::empty()).increment();

    let convention = registry.config().naming_convention();

    for meter in registry.meters() {
        let id = meter.id();
        let tags: Vec<String> = id
            .convention_tags(convention.as_ref())
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        println!("{} [{}]", id.convention_name(convention.as_ref()), tags.join(","));

        for measurement in meter.measure(TimeUnit::Milliseconds) {
            println!("    {} = {}", measurement.statistic(), measurement.value());
        }
    }
}
