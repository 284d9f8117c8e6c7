use std::mem;
use std::sync::Arc;

use foldhash::HashSet;
use tracing::warn;
use vernier::{
    Backend, Id, Meter, MeterRegistry, MeterSnapshot, NamingConvention, Payload, Result, Sender,
    Statistic, StepPublisher, TimeUnit,
};

use crate::line_builder::LineBuilder;
use crate::{Flavor, StatsdConfig};

const COUNTER: &str = "c";
const GAUGE: &str = "g";

/// Renders meters as StatsD lines and packs them into datagram-sized payloads.
///
/// Time-based statistics are reported in milliseconds. Step-scoped values (counts and totals
/// since the last publish) are sent as counters, everything else as gauges.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use vernier::{MeterRegistry, Sender, Tags};
/// use vernier_statsd::{StatsdBackend, StatsdConfig};
/// # async fn example(sender: Arc<dyn Sender>) -> vernier::Result<()> {
///
/// let registry = MeterRegistry::new();
///
/// let publisher = StatsdBackend::publisher(registry.clone(), &StatsdConfig::default(), sender)?;
/// let handle = publisher.start();
///
/// registry.counter("jobs.completed", Tags::empty()).increment();
///
/// handle.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StatsdBackend {
    flavor: Flavor,
    address: String,
    max_packet_length: usize,

    builders: scc::HashMap<Id, Arc<LineBuilder>>,
}

impl StatsdBackend {
    /// Creates a backend from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &StatsdConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            flavor: config.flavor,
            address: config.address(),
            max_packet_length: config.max_packet_length,
            builders: scc::HashMap::new(),
        })
    }

    /// Creates a publisher that exports `registry` to StatsD through `sender`.
    ///
    /// Meters are named by the convention of the flavor, unless the registry has an
    /// explicitly configured naming convention.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn publisher(
        registry: MeterRegistry,
        config: &StatsdConfig,
        sender: Arc<dyn Sender>,
    ) -> Result<StepPublisher<Self>> {
        let backend = Self::new(config)?;
        StepPublisher::new(registry, backend, sender, config.step.clone())
    }

    /// The flavor lines are rendered in.
    #[must_use]
    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn builder(&self, id: &Id) -> Arc<LineBuilder> {
        if let Some(builder) = self.builders.read(id, |_, builder| Arc::clone(builder)) {
            return builder;
        }

        let rules = self.flavor.rules();

        let entry = self
            .builders
            .entry(id.clone())
            .or_insert_with(|| Arc::new(LineBuilder::new(Arc::new(id.clone()), rules)));

        Arc::clone(entry.get())
    }

    fn pack(&self, lines: Vec<String>) -> Vec<Payload> {
        let mut payloads = Vec::new();
        let mut body = String::new();
        let mut records = 0_usize;

        for line in lines {
            if line.len() > self.max_packet_length {
                warn!(
                    length = line.len(),
                    max_packet_length = self.max_packet_length,
                    "StatsD line longer than the maximum packet length, sending it on its own"
                );
            }

            // +1 for the newline separating it from the previous line.
            let needed = line.len().saturating_add(1);

            if records > 0 && body.len().saturating_add(needed) > self.max_packet_length {
                payloads.push(self.payload(mem::take(&mut body), records));
                records = 0;
            }

            if records > 0 {
                body.push('\n');
            }

            body.push_str(&line);
            records = records.saturating_add(1);
        }

        if records > 0 {
            payloads.push(self.payload(body, records));
        }

        payloads
    }

    fn payload(&self, body: String, records: usize) -> Payload {
        Payload::new(body, records)
            .with_uri(self.address.clone())
            .with_content_type("text/plain")
    }
}

impl Backend for StatsdBackend {
    type Record = String;

    fn name(&self) -> &'static str {
        "statsd"
    }

    fn base_time_unit(&self) -> TimeUnit {
        TimeUnit::Milliseconds
    }

    fn naming_convention(&self) -> Option<Arc<dyn NamingConvention>> {
        Some(self.flavor.naming_convention())
    }

    fn write(
        &self,
        meter: &Meter,
        snapshot: &MeterSnapshot,
        convention: &Arc<dyn NamingConvention>,
    ) -> Vec<String> {
        let builder = self.builder(meter.id());

        let line = |statistic: Statistic, tagged: bool| {
            snapshot
                .value(statistic)
                .filter(|value| value.is_finite())
                .map(|value| {
                    builder.line(
                        convention,
                        value,
                        tagged.then_some(statistic),
                        type_of(statistic),
                    )
                })
        };

        let mut lines: Vec<String> = match meter {
            Meter::Counter(_) | Meter::FunctionCounter(_) => {
                line(Statistic::Count, false).into_iter().collect()
            }
            Meter::Gauge(_) => line(Statistic::Value, false).into_iter().collect(),
            Meter::Timer(_) => [
                line(Statistic::Count, true),
                line(Statistic::TotalTime, true),
                line(Statistic::Max, true),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Meter::DistributionSummary(_) => [
                line(Statistic::Count, true),
                line(Statistic::Total, true),
                line(Statistic::Max, true),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Meter::LongTaskTimer(_) => [
                line(Statistic::ActiveTasks, true),
                line(Statistic::Duration, true),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Meter::FunctionTimer(_) => [
                line(Statistic::Count, true),
                line(Statistic::TotalTime, true),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Meter::Custom(_) => snapshot
                .measurements()
                .iter()
                .filter(|m| m.value().is_finite())
                .map(|m| {
                    builder.line(
                        convention,
                        m.value(),
                        Some(m.statistic()),
                        type_of(m.statistic()),
                    )
                })
                .collect(),
        };

        if let Some(histogram) = snapshot.histogram() {
            lines.extend(histogram.cumulative().map(|bucket| {
                builder.bucket_line(
                    convention,
                    count_as_f64(bucket.count()),
                    bucket.upper_bound(),
                    GAUGE,
                )
            }));
        }

        lines
    }

    fn encode(&self, records: Vec<String>) -> Result<Vec<Payload>> {
        Ok(self.pack(records))
    }

    fn retain(&self, meters: &[Meter]) {
        let live: HashSet<&Id> = meters.iter().map(Meter::id).collect();

        self.builders.retain(|id, _| live.contains(id));
    }
}

/// Counts and totals accumulated since the last publish are StatsD counters, the server
/// sums them up. Everything else describes a current state.
fn type_of(statistic: Statistic) -> &'static str {
    match statistic {
        Statistic::Count | Statistic::Total | Statistic::TotalTime => COUNTER,
        _ => GAUGE,
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "bucket counts of one step stay far below 2^53"
)]
fn count_as_f64(count: u64) -> f64 {
    count as f64
}
