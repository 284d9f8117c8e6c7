//! Integration tests for `StepPublisher`, using a plain-text backend and an in-memory sender.

#![allow(
    clippy::indexing_slicing,
    reason = "integration tests with known-valid indices verified by earlier assertions"
)]

use std::result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use vernier::{
    Backend, Meter, MeterRegistry, MeterSnapshot, NamingConvention, Payload, PublisherState,
    Response, Result, SendError, Sender, StepConfig, StepPublisher, Tags, TimeUnit,
};

/// One line per measurement: `name statistic=value`. One payload per batch.
#[derive(Debug)]
struct PlainTextBackend;

impl Backend for PlainTextBackend {
    type Record = String;

    fn name(&self) -> &'static str {
        "plain"
    }

    fn base_time_unit(&self) -> TimeUnit {
        TimeUnit::Seconds
    }

    fn write(
        &self,
        meter: &Meter,
        snapshot: &MeterSnapshot,
        convention: &Arc<dyn NamingConvention>,
    ) -> Vec<String> {
        let name = meter.id().convention_name(convention.as_ref());

        snapshot
            .measurements()
            .iter()
            .filter(|m| m.value().is_finite())
            .map(|m| format!("{name} {}={}", m.statistic(), m.value()))
            .collect()
    }

    fn encode(&self, records: Vec<String>) -> Result<Vec<Payload>> {
        let count = records.len();
        Ok(vec![Payload::new(records.join("\n"), count)])
    }
}

/// Keeps every payload it is given. Payloads whose body contains `fail_marker` fail with a
/// transport error.
#[derive(Debug, Default)]
struct MemorySender {
    payloads: Mutex<Vec<Payload>>,
    fail_marker: Option<&'static str>,
}

impl MemorySender {
    fn failing_on(marker: &'static str) -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            fail_marker: Some(marker),
        }
    }

    fn bodies(&self) -> Vec<String> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.body().to_string())
            .collect()
    }
}

impl Sender for MemorySender {
    fn send(&self, payload: Payload) -> BoxFuture<'static, result::Result<Response, SendError>> {
        let fail = self
            .fail_marker
            .is_some_and(|marker| payload.body().contains(marker));

        self.payloads.lock().unwrap().push(payload);

        async move {
            if fail {
                Err(SendError::transport("connection refused"))
            } else {
                Ok(Response::new(202, ""))
            }
        }
        .boxed()
    }
}

fn config(batch_size: usize) -> StepConfig {
    StepConfig {
        step: Duration::from_secs(10),
        batch_size,
        ..StepConfig::default()
    }
}

fn as_dyn(sender: &Arc<MemorySender>) -> Arc<dyn Sender> {
    Arc::<MemorySender>::clone(sender)
}

async fn let_sends_complete() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn gauge_without_value_produces_no_records() {
    let registry = MeterRegistry::new();
    _ = registry.gauge("queue.depth", Tags::empty(), || f64::NAN);

    let sender = Arc::new(MemorySender::default());
    let publisher =
        StepPublisher::new(registry, PlainTextBackend, as_dyn(&sender), config(10))
            .unwrap();

    let summary = publisher.run_one_iteration();
    let_sends_complete().await;

    assert_eq!(summary.records, 0);
    assert_eq!(summary.skipped_meters, 1);
    assert!(sender.bodies().is_empty());
}

#[tokio::test]
async fn step_meters_reset_after_publish_while_gauges_persist() {
    let registry = MeterRegistry::new();
    let counter = registry.counter("jobs", Tags::empty());
    _ = registry.gauge("pool.size", Tags::empty(), || 7.0);

    counter.increment_by(3.0);

    let sender = Arc::new(MemorySender::default());
    let publisher = StepPublisher::new(
        registry.clone(),
        PlainTextBackend,
        as_dyn(&sender),
        config(10),
    )
    .unwrap();

    _ = publisher.run_one_iteration();
    _ = publisher.run_one_iteration();
    let_sends_complete().await;

    let bodies = sender.bodies();
    assert_eq!(bodies.len(), 2);

    assert!(bodies[0].contains("jobs count=3"));
    assert!(bodies[0].contains("pool.size value=7"));
    assert!(bodies[1].contains("jobs count=0"));
    assert!(bodies[1].contains("pool.size value=7"));

    assert!(counter.count().abs() < f64::EPSILON);
}

#[tokio::test]
async fn meters_are_split_into_bounded_batches() {
    let registry = MeterRegistry::new();
    for index in 0..25 {
        _ = registry.counter("shard.writes", Tags::of([("shard", index.to_string())]));
    }

    let sender = Arc::new(MemorySender::default());
    let publisher =
        StepPublisher::new(registry, PlainTextBackend, as_dyn(&sender), config(10))
            .unwrap();

    let summary = publisher.run_one_iteration();
    let_sends_complete().await;

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.payloads, 3);
    assert_eq!(summary.records, 25);

    let records_per_payload: Vec<usize> = sender
        .payloads
        .lock()
        .unwrap()
        .iter()
        .map(Payload::records)
        .collect();
    assert_eq!(records_per_payload, vec![10, 10, 5]);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_does_not_affect_other_batches_or_later_steps() {
    let registry = MeterRegistry::new();
    _ = registry.counter("healthy", Tags::empty());
    _ = registry.counter("doomed", Tags::empty());

    let sender = Arc::new(MemorySender::failing_on("doomed"));
    let handle =
        StepPublisher::new(registry, PlainTextBackend, as_dyn(&sender), config(1))
            .unwrap()
            .start();

    // Paused time auto-advances, so this covers at least three steps.
    tokio::time::sleep(Duration::from_secs(41)).await;
    let_sends_complete().await;

    let sent = handle.stats().sent_payloads();
    let failed = handle.stats().failed_payloads();

    assert!(sent >= 3, "expected at least 3 successful sends, got {sent}");
    assert_eq!(sent, failed);
    assert!(
        sender.bodies().iter().filter(|b| b.contains("healthy")).count() >= 3,
        "healthy meter must be published on every step"
    );

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn close_publishes_one_final_step() {
    let registry = MeterRegistry::new();
    let counter = registry.counter("shutdown.flushed", Tags::empty());

    let sender = Arc::new(MemorySender::default());
    let handle = StepPublisher::new(
        registry,
        PlainTextBackend,
        as_dyn(&sender),
        StepConfig {
            step: Duration::from_secs(3600),
            ..StepConfig::default()
        },
    )
    .unwrap()
    .start();

    counter.increment_by(5.0);

    handle.close().await;
    let_sends_complete().await;

    let bodies = sender.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("shutdown.flushed count=5"));
}

#[tokio::test(start_paused = true)]
async fn stopped_publisher_publishes_nothing_more() {
    let registry = MeterRegistry::new();
    _ = registry.counter("ticks", Tags::empty());

    let sender = Arc::new(MemorySender::default());
    let handle =
        StepPublisher::new(registry, PlainTextBackend, as_dyn(&sender), config(10))
            .unwrap()
            .start();

    handle.stop();
    tokio::time::sleep(Duration::from_secs(60)).await;
    let_sends_complete().await;

    assert!(sender.bodies().is_empty());
    assert_eq!(handle.state(), PublisherState::Stopped);
}

#[test]
fn step_config_from_toml() {
    let config: StepConfig = toml::from_str(
        r#"
        step = "30s"
        batch_size = 500
        "#,
    )
    .unwrap();

    assert!(config.enabled);
    assert_eq!(config.step, Duration::from_secs(30));
    assert_eq!(config.batch_size, 500);
}
