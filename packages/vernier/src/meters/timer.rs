use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use crate::atomics::{METER_ACCESS_ORDERING, u64_to_f64};
use crate::meters::histogram::Histogram;
use crate::{
    Clock, Id, Measurement, Meter, MeterKind, MeterRegistry, MeterSnapshot, MeterText, Statistic,
    Tag, TimeUnit,
};

/// Records the count, total and maximum of short durations, such as request latencies.
///
/// Count, total and maximum are step-scoped: they describe the durations recorded since
/// the previous publish. Optionally, the timer also counts durations into histogram buckets
/// with fixed upper bounds.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use vernier::{MeterRegistry, Timer};
///
/// let registry = MeterRegistry::new();
///
/// let latency = Timer::builder("http.server.requests")
///     .tag("uri", "/orders")
///     .buckets(&[Duration::from_millis(10), Duration::from_millis(100)])
///     .register(&registry);
///
/// latency.record(Duration::from_millis(25));
/// let answer = latency.time(|| 6 * 7);
///
/// assert_eq!(answer, 42);
/// assert_eq!(latency.count(), 2);
/// assert!(latency.max() >= Duration::from_millis(25));
/// ```
#[derive(Clone, Debug)]
pub struct Timer {
    id: Arc<Id>,
    clock: Arc<dyn Clock>,

    // None if this is a no-op timer.
    state: Option<Arc<TimerState>>,
}

#[derive(Debug)]
struct TimerState {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,

    // Upper bounds in nanoseconds.
    histogram: Option<Histogram>,
}

impl Timer {
    /// Starts building a timer with the given name.
    #[must_use]
    pub fn builder(name: impl Into<MeterText>) -> TimerBuilder {
        TimerBuilder {
            id: Id::new(name, MeterKind::Timer),
            buckets: Vec::new(),
        }
    }

    pub(crate) fn new(id: Arc<Id>, clock: Arc<dyn Clock>, buckets: &[Duration]) -> Self {
        let bounds = buckets
            .iter()
            .map(|bucket| u64_to_f64(nanos_of(*bucket)))
            .collect::<Vec<_>>();

        Self {
            id,
            clock,
            state: Some(Arc::new(TimerState {
                count: AtomicU64::new(0),
                total_nanos: AtomicU64::new(0),
                max_nanos: AtomicU64::new(0),
                histogram: Histogram::new(&bounds),
            })),
        }
    }

    pub(crate) fn noop(id: Arc<Id>, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            clock,
            state: None,
        }
    }

    /// Records one duration.
    pub fn record(&self, duration: Duration) {
        let Some(state) = &self.state else {
            return;
        };

        let nanos = nanos_of(duration);

        state.count.fetch_add(1, METER_ACCESS_ORDERING);
        // Saturates instead of wrapping, so huge durations cannot shrink the total.
        _ = state.total_nanos.fetch_update(
            METER_ACCESS_ORDERING,
            METER_ACCESS_ORDERING,
            |total| Some(total.saturating_add(nanos)),
        );
        state.max_nanos.fetch_max(nanos, METER_ACCESS_ORDERING);

        if let Some(histogram) = &state.histogram {
            histogram.record(u64_to_f64(nanos));
        }
    }

    /// Records one duration given in seconds. Negative and non-finite amounts are ignored.
    pub fn record_seconds(&self, seconds: f64) {
        if let Ok(duration) = Duration::try_from_secs_f64(seconds) {
            self.record(duration);
        }
    }

    /// Runs `f` and records how long it took.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let sample = self.start();
        let result = f();
        sample.stop(self);
        result
    }

    /// Starts timing an operation. Call [`TimerSample::stop`] when it completes.
    ///
    /// The sample may be stopped against any timer, which is useful when the tags of the
    /// timer depend on the outcome of the operation.
    #[must_use]
    pub fn start(&self) -> TimerSample {
        TimerSample {
            clock: Arc::clone(&self.clock),
            started: self.clock.now(),
        }
    }

    /// Number of durations recorded since the last publish.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |state| state.count.load(METER_ACCESS_ORDERING))
    }

    /// Sum of the durations recorded since the last publish.
    #[must_use]
    pub fn total_time(&self) -> Duration {
        self.state.as_ref().map_or(Duration::ZERO, |state| {
            Duration::from_nanos(state.total_nanos.load(METER_ACCESS_ORDERING))
        })
    }

    /// Longest duration recorded since the last publish.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.state.as_ref().map_or(Duration::ZERO, |state| {
            Duration::from_nanos(state.max_nanos.load(METER_ACCESS_ORDERING))
        })
    }

    /// Average of the durations recorded since the last publish, zero if there were none.
    #[must_use]
    pub fn mean(&self) -> Duration {
        let count = self.count();

        if count == 0 {
            return Duration::ZERO;
        }

        let mean_nanos = self.total_time().as_nanos() / u128::from(count);
        Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX))
    }

    /// The identity of the timer.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this timer discards all writes because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.state.is_none()
    }

    pub(crate) fn measure(&self, unit: TimeUnit) -> Vec<Measurement> {
        measurements(
            self.count(),
            nanos_of(self.total_time()),
            nanos_of(self.max()),
            unit,
        )
    }

    pub(crate) fn take_snapshot(&self, unit: TimeUnit) -> MeterSnapshot {
        let Some(state) = &self.state else {
            return MeterSnapshot::new(measurements(0, 0, 0, unit));
        };

        let count = state.count.swap(0, METER_ACCESS_ORDERING);
        let total = state.total_nanos.swap(0, METER_ACCESS_ORDERING);
        let max = state.max_nanos.swap(0, METER_ACCESS_ORDERING);

        let snapshot = MeterSnapshot::new(measurements(count, total, max, unit));

        match &state.histogram {
            Some(histogram) => snapshot.with_histogram(histogram.take(unit.nanos_per_unit())),
            None => snapshot,
        }
    }
}

/// An operation being timed. Created by [`Timer::start`].
#[derive(Debug)]
#[must_use = "a sample records nothing until stopped"]
pub struct TimerSample {
    clock: Arc<dyn Clock>,
    started: Instant,
}

impl TimerSample {
    /// Records the time elapsed since the sample was started into `timer`.
    pub fn stop(self, timer: &Timer) -> Duration {
        let elapsed = self.clock.now().saturating_duration_since(self.started);
        timer.record(elapsed);
        elapsed
    }
}

/// Creates instances of [`Timer`]. Use `Timer::builder()` to create a new instance.
#[derive(Debug)]
#[must_use]
pub struct TimerBuilder {
    id: Id,
    buckets: Vec<Duration>,
}

impl TimerBuilder {
    /// Adds a tag, replacing any existing tag with the same key.
    pub fn tag(self, key: impl Into<MeterText>, value: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_tag(key, value),
            ..self
        }
    }

    /// Adds tags, replacing any existing tags with the same keys.
    pub fn tags(self, tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            id: self.id.with_tags(tags),
            ..self
        }
    }

    /// Sets a human-readable description.
    pub fn description(self, description: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_description(description),
            ..self
        }
    }

    /// Counts recorded durations into histogram buckets with the given inclusive upper bounds.
    pub fn buckets(self, upper_bounds: &[Duration]) -> Self {
        Self {
            buckets: upper_bounds.to_vec(),
            ..self
        }
    }

    /// Registers the timer, or returns the already registered timer with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> Timer {
        let clock = registry.config().clock();
        let buckets = self.buckets;

        match registry.get_or_create(self.id, |id| {
            Meter::Timer(Timer::new(id, Arc::clone(&clock), &buckets))
        }) {
            Meter::Timer(timer) => timer,
            other => Timer::noop(Arc::clone(other.shared_id()), clock),
        }
    }
}

fn nanos_of(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

// Count, total and max, with the times converted from nanoseconds into `unit`.
fn measurements(count: u64, total_nanos: u64, max_nanos: u64, unit: TimeUnit) -> Vec<Measurement> {
    vec![
        Measurement::new(Statistic::Count, u64_to_f64(count)),
        Measurement::new(Statistic::TotalTime, unit.scale_nanos(u64_to_f64(total_nanos))),
        Measurement::new(Statistic::Max, unit.scale_nanos(u64_to_f64(max_nanos))),
    ]
}
