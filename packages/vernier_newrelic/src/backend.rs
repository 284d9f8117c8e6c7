use std::fmt::{self, Debug};
use std::sync::Arc;

use foldhash::HashSet;
use serde_json::Value;
use tracing::debug;
use vernier::{
    Backend, Error, Id, Meter, MeterRegistry, MeterSnapshot, NamingConvention, Payload, Result,
    Sender, Statistic, StepPublisher, TimeUnit,
};

use crate::event::{Event, EventBuilder};
use crate::{NewRelicConfig, NewRelicNamingConvention};

/// Renders meters as New Relic Insights events and posts each batch as one JSON array.
///
/// Every meter becomes one event whose attributes depend on the meter kind. Time-based
/// attributes are in seconds and the event says so in `timeUnit`.
///
/// | Kind                   | Attributes                                      |
/// |------------------------|-------------------------------------------------|
/// | counter                | `throughput`                                    |
/// | gauge                  | `value`                                         |
/// | timer                  | `count`, `avg`, `totalTime`, `max`, `timeUnit`  |
/// | distribution summary   | `count`, `avg`, `total`, `max`                  |
/// | long task timer        | `activeTasks`, `duration`, `timeUnit`           |
/// | function counter       | `throughput`                                    |
/// | function timer         | `count`, `avg`, `totalTime`, `timeUnit`         |
/// | custom                 | one attribute per measurement, by statistic     |
///
/// A meter with a non-finite attribute value produces no event.
pub struct NewRelicBackend {
    // `None` if every meter is reported under its own name.
    event_type: Option<String>,
    endpoint: String,
    api_key: String,

    builders: scc::HashMap<Id, Arc<EventBuilder>>,
}

impl NewRelicBackend {
    /// Creates a backend from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &NewRelicConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            event_type: (!config.meter_name_event_type_enabled).then(|| config.event_type.clone()),
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            builders: scc::HashMap::new(),
        })
    }

    /// Creates a publisher that exports `registry` to New Relic through `sender`.
    ///
    /// Meters are named by [`NewRelicNamingConvention`], unless the registry has an
    /// explicitly configured naming convention.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn publisher(
        registry: MeterRegistry,
        config: &NewRelicConfig,
        sender: Arc<dyn Sender>,
    ) -> Result<StepPublisher<Self>> {
        let backend = Self::new(config)?;
        StepPublisher::new(registry, backend, sender, config.capped_step())
    }

    fn builder(&self, id: &Id) -> Arc<EventBuilder> {
        if let Some(builder) = self.builders.read(id, |_, builder| Arc::clone(builder)) {
            return builder;
        }

        let entry = self
            .builders
            .entry(id.clone())
            .or_insert_with(|| Arc::new(EventBuilder::new(Arc::new(id.clone()))));

        Arc::clone(entry.get())
    }

    fn time_unit(&self) -> (String, Value) {
        ("timeUnit".to_string(), Value::from(self.base_time_unit().as_str()))
    }
}

impl Debug for NewRelicBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewRelicBackend")
            .field("event_type", &self.event_type)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Backend for NewRelicBackend {
    type Record = Event;

    fn name(&self) -> &'static str {
        "newrelic"
    }

    fn base_time_unit(&self) -> TimeUnit {
        TimeUnit::Seconds
    }

    fn naming_convention(&self) -> Option<Arc<dyn NamingConvention>> {
        Some(Arc::new(NewRelicNamingConvention))
    }

    fn write(
        &self,
        meter: &Meter,
        snapshot: &MeterSnapshot,
        convention: &Arc<dyn NamingConvention>,
    ) -> Vec<Event> {
        let stat = |statistic: Statistic| snapshot.value(statistic).unwrap_or(f64::NAN);
        let count = stat(Statistic::Count);

        let numbers: Vec<(&str, f64)> = match meter {
            Meter::Counter(_) | Meter::FunctionCounter(_) => vec![("throughput", count)],
            Meter::Gauge(_) => vec![("value", stat(Statistic::Value))],
            Meter::Timer(_) => vec![
                ("count", count),
                ("avg", mean(stat(Statistic::TotalTime), count)),
                ("totalTime", stat(Statistic::TotalTime)),
                ("max", stat(Statistic::Max)),
            ],
            Meter::DistributionSummary(_) => vec![
                ("count", count),
                ("avg", mean(stat(Statistic::Total), count)),
                ("total", stat(Statistic::Total)),
                ("max", stat(Statistic::Max)),
            ],
            Meter::LongTaskTimer(_) => vec![
                ("activeTasks", stat(Statistic::ActiveTasks)),
                ("duration", stat(Statistic::Duration)),
            ],
            Meter::FunctionTimer(_) => vec![
                ("count", count),
                ("avg", mean(stat(Statistic::TotalTime), count)),
                ("totalTime", stat(Statistic::TotalTime)),
            ],
            Meter::Custom(_) => snapshot
                .measurements()
                .iter()
                .filter(|m| m.value().is_finite())
                .map(|m| (m.statistic().tag_value(), m.value()))
                .collect(),
        };

        if numbers.is_empty() || numbers.iter().any(|(_, value)| !value.is_finite()) {
            debug!(meter = %meter.id(), "omitting New Relic event without finite attribute values");
            return Vec::new();
        }

        let mut attributes: Vec<(String, Value)> = numbers
            .into_iter()
            .map(|(key, value)| (key.to_string(), Value::from(value)))
            .collect();

        if matches!(
            meter,
            Meter::Timer(_) | Meter::LongTaskTimer(_) | Meter::FunctionTimer(_)
        ) {
            attributes.push(self.time_unit());
        }

        let event = self.builder(meter.id()).event(
            convention,
            self.event_type.as_deref(),
            attributes,
        );

        vec![event]
    }

    fn encode(&self, records: Vec<Event>) -> Result<Vec<Payload>> {
        let count = records.len();

        let body = serde_json::to_string(&records).map_err(|e| Error::Encoding {
            backend: self.name().to_string(),
            problem: e.to_string(),
        })?;

        Ok(vec![
            Payload::new(body, count)
                .with_uri(self.endpoint.clone())
                .with_header("X-Insert-Key", self.api_key.clone())
                .with_content_type("application/json"),
        ])
    }

    fn retain(&self, meters: &[Meter]) {
        let live: HashSet<&Id> = meters.iter().map(Meter::id).collect();

        self.builders.retain(|id, _| live.contains(id));
    }
}

fn mean(total: f64, count: f64) -> f64 {
    if count > 0.0 { total / count } else { 0.0 }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use static_assertions::assert_impl_all;
    use vernier::naming::Identity;
    use vernier::{Measurement, Tags};

    use super::*;

    assert_impl_all!(NewRelicBackend: Send, Sync);

    fn config() -> NewRelicConfig {
        NewRelicConfig {
            account_id: "12345".to_string(),
            api_key: "secret".to_string(),
            ..NewRelicConfig::default()
        }
    }

    fn backend() -> NewRelicBackend {
        NewRelicBackend::new(&config()).unwrap()
    }

    fn write(backend: &NewRelicBackend, meter: &Meter) -> Vec<Value> {
        let convention: Arc<dyn NamingConvention> = Arc::new(Identity::default());
        let snapshot = MeterSnapshot::new(meter.measure(backend.base_time_unit()));

        backend
            .write(meter, &snapshot, &convention)
            .into_iter()
            .map(Value::Object)
            .collect()
    }

    #[test]
    fn missing_account_is_rejected() {
        let result = NewRelicBackend::new(&NewRelicConfig::default());

        assert!(matches!(result, Err(Error::MissingConfiguration { .. })));
    }

    #[test]
    fn counter_event() {
        let registry = MeterRegistry::new();
        let counter = registry.counter("jobs", Tags::of([("queue", "mail")]));
        counter.increment_by(3.0);

        let events = write(&backend(), &Meter::Counter(counter));

        assert_eq!(
            events,
            vec![json!({
                "eventType": "VernierSample",
                "throughput": 3.0,
                "metricName": "jobs",
                "metricType": "COUNTER",
                "queue": "mail",
            })]
        );
    }

    #[test]
    fn timer_event_in_seconds() {
        let registry = MeterRegistry::new();
        let timer = registry.timer("latency", Tags::empty());
        timer.record(Duration::from_secs(1));
        timer.record(Duration::from_secs(2));

        let events = write(&backend(), &Meter::Timer(timer));

        assert_eq!(
            events,
            vec![json!({
                "eventType": "VernierSample",
                "count": 2.0,
                "avg": 1.5,
                "totalTime": 3.0,
                "max": 2.0,
                "timeUnit": "seconds",
                "metricName": "latency",
                "metricType": "TIMER",
            })]
        );
    }

    #[test]
    fn empty_summary_has_zero_average() {
        let registry = MeterRegistry::new();
        let summary = registry.summary("payload.size", Tags::empty());

        let events = write(&backend(), &Meter::DistributionSummary(summary));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["avg"], json!(0.0));
        assert_eq!(events[0]["count"], json!(0.0));
    }

    #[test]
    fn nan_gauge_produces_no_event() {
        let registry = MeterRegistry::new();
        let gauge = registry.gauge("broken", Tags::empty(), || f64::NAN);

        assert!(write(&backend(), &Meter::Gauge(gauge)).is_empty());
    }

    #[test]
    fn custom_meter_skips_non_finite_measurements() {
        let registry = MeterRegistry::new();
        let custom = registry.custom("cache", Tags::empty(), || {
            vec![
                Measurement::new(Statistic::Count, 12.0),
                Measurement::new(Statistic::Value, f64::INFINITY),
            ]
        });

        let events = write(&backend(), &Meter::Custom(custom));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["count"], json!(12.0));
        assert!(events[0].get("value").is_none());
    }

    #[test]
    fn encode_posts_one_array_per_batch() {
        let backend = backend();
        let registry = MeterRegistry::new();
        let counter = registry.counter("jobs", Tags::empty());

        let convention: Arc<dyn NamingConvention> = Arc::new(Identity::default());
        let meter = Meter::Counter(counter);
        let snapshot = MeterSnapshot::new(meter.measure(TimeUnit::Seconds));
        let records = backend.write(&meter, &snapshot, &convention);

        let payloads = backend.encode(records).unwrap();

        assert_eq!(payloads.len(), 1);
        let payload = &payloads[0];
        assert_eq!(
            payload.uri(),
            Some("https://insights-collector.newrelic.com/v1/accounts/12345/events")
        );
        assert_eq!(payload.header("X-Insert-Key"), Some("secret"));
        assert_eq!(payload.content_type(), Some("application/json"));
        assert_eq!(payload.records(), 1);

        let body: Vec<Value> = serde_json::from_str(payload.body()).unwrap();
        assert_eq!(body[0]["metricName"], json!("jobs"));
    }

    #[test]
    fn retain_drops_builders_of_removed_meters() {
        let registry = MeterRegistry::new();
        let kept = registry.counter("kept", Tags::empty());
        let removed = registry.counter("removed", Tags::empty());

        let backend = backend();
        _ = write(&backend, &Meter::Counter(kept));
        _ = write(&backend, &Meter::Counter(removed.clone()));
        assert_eq!(backend.builders.len(), 2);

        _ = registry.remove(removed.id());
        backend.retain(&registry.meters());

        assert_eq!(backend.builders.len(), 1);
    }
}
