//! Publishes a few meters in the Telegraf flavor every second, printing each datagram
//! instead of sending it.

use std::result;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use vernier::{MeterRegistry, Payload, Response, SendError, Sender, StepConfig, Tags};
use vernier_statsd::{Flavor, StatsdBackend, StatsdConfig};

#[derive(Debug)]
struct StdoutSender;

impl Sender for StdoutSender {
    fn send(&self, payload: Payload) -> BoxFuture<'static, result::Result<Response, SendError>> {
        println!(
            "--- {} ({} lines)",
            payload.uri().unwrap_or("?"),
            payload.records()
        );
        println!("{}", payload.body());

        async { Ok(Response::new(200, "")) }.boxed()
    }
}

#[tokio::main]
async fn main() -> vernier::Result<()> {
    let registry = MeterRegistry::new();

    let config = StatsdConfig {
        step: StepConfig {
            step: Duration::from_secs(1),
            ..StepConfig::default()
        },
        flavor: Flavor::Telegraf,
        ..StatsdConfig::default()
    };

    let handle = StatsdBackend::publisher(registry.clone(), &config, Arc::new(StdoutSender))?.start();

    let orders = registry.counter("shop.orders", Tags::of([("region", "eu")]));
    let checkout = registry.timer("shop.checkout.latency", Tags::of([("region", "eu")]));

    for millis in [12_u64, 30, 45, 80].into_iter().cycle().take(30) {
        orders.increment();
        checkout.record(Duration::from_millis(millis));

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    handle.close().await;

    // Give the final send a moment to print.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(())
}
