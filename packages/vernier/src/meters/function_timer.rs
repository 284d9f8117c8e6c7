use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use crate::atomics::AtomicF64;
use crate::meters::function_counter::advance;
use crate::{Id, Measurement, Meter, MeterKind, MeterRegistry, MeterText, Statistic, Tag, TimeUnit};

type ReadFn = dyn Fn() -> Option<(f64, f64)> + Send + Sync;

/// A timer whose count and total time are maintained by some other object, such as a
/// cache that tracks how many loads it performed and how long they took in total.
///
/// Both functions must return monotonically increasing totals. On every publish the timer
/// reports the increase of each since the previous publish. The object is referenced
/// weakly; once it has been dropped, the timer reports NaN and exporters skip it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use vernier::{FunctionTimer, MeterRegistry, TimeUnit};
///
/// struct LoadStats {
///     loads: f64,
///     load_millis: f64,
/// }
///
/// let registry = MeterRegistry::new();
/// let stats = Arc::new(LoadStats { loads: 4.0, load_millis: 200.0 });
///
/// let timer = FunctionTimer::builder(
///     "cache.loads",
///     &stats,
///     |s| s.loads,
///     |s| s.load_millis,
///     TimeUnit::Milliseconds,
/// )
/// .register(&registry);
///
/// assert_eq!(timer.count(), 4.0);
/// assert_eq!(timer.total_time(TimeUnit::Seconds), 0.2);
/// ```
#[derive(Clone)]
pub struct FunctionTimer {
    id: Arc<Id>,

    // None if this is a no-op timer.
    state: Option<Arc<FunctionTimerState>>,
}

struct FunctionTimerState {
    // Returns (count, total time) or None once the source object has been dropped.
    read: Box<ReadFn>,
    total_time_unit: TimeUnit,

    count_baseline: AtomicF64,
    total_baseline: AtomicF64,
}

impl FunctionTimer {
    /// Starts building a timer from a count function and a total time function.
    ///
    /// `total_time_unit` is the unit in which `total_time_fn` reports.
    pub fn builder<T, C, F>(
        name: impl Into<MeterText>,
        object: &Arc<T>,
        count_fn: C,
        total_time_fn: F,
        total_time_unit: TimeUnit,
    ) -> FunctionTimerBuilder
    where
        T: Send + Sync + 'static,
        C: Fn(&T) -> f64 + Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        let object: Weak<T> = Arc::downgrade(object);

        FunctionTimerBuilder {
            id: Id::new(name, MeterKind::FunctionTimer),
            read: Box::new(move || {
                object
                    .upgrade()
                    .map(|object| (count_fn(&object), total_time_fn(&object)))
            }),
            total_time_unit,
        }
    }

    pub(crate) fn new(id: Arc<Id>, read: Box<ReadFn>, total_time_unit: TimeUnit) -> Self {
        Self {
            id,
            state: Some(Arc::new(FunctionTimerState {
                read,
                total_time_unit,
                count_baseline: AtomicF64::default(),
                total_baseline: AtomicF64::default(),
            })),
        }
    }

    pub(crate) fn noop(id: Arc<Id>) -> Self {
        Self { id, state: None }
    }

    /// The increase of the count since the last publish, or NaN if the source object has
    /// been dropped.
    #[must_use]
    pub fn count(&self) -> f64 {
        let Some(state) = &self.state else {
            return 0.0;
        };

        (state.read)().map_or(f64::NAN, |(count, _)| {
            (count - state.count_baseline.load()).max(0.0)
        })
    }

    /// The increase of the total time since the last publish, expressed in `unit`, or NaN
    /// if the source object has been dropped.
    #[must_use]
    pub fn total_time(&self, unit: TimeUnit) -> f64 {
        let Some(state) = &self.state else {
            return 0.0;
        };

        (state.read)().map_or(f64::NAN, |(_, total)| {
            state.rescale((total - state.total_baseline.load()).max(0.0), unit)
        })
    }

    /// The identity of the timer.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this timer reports nothing because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.state.is_none()
    }

    pub(crate) fn measure(&self, unit: TimeUnit) -> Vec<Measurement> {
        vec![
            Measurement::new(Statistic::Count, self.count()),
            Measurement::new(Statistic::TotalTime, self.total_time(unit)),
        ]
    }

    /// Reads the increases since the last publish and advances both baselines.
    pub(crate) fn take(&self, unit: TimeUnit) -> (f64, f64) {
        let Some(state) = &self.state else {
            return (0.0, 0.0);
        };

        match (state.read)() {
            Some((count, total)) => (
                advance(&state.count_baseline, count),
                state.rescale(advance(&state.total_baseline, total), unit),
            ),
            None => (f64::NAN, f64::NAN),
        }
    }
}

impl FunctionTimerState {
    fn rescale(&self, total: f64, unit: TimeUnit) -> f64 {
        unit.scale_seconds(self.total_time_unit.to_seconds(total))
    }
}

impl Debug for FunctionTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTimer")
            .field("id", &self.id)
            .field("noop", &self.is_noop())
            .finish_non_exhaustive()
    }
}

/// Creates instances of [`FunctionTimer`]. Use `FunctionTimer::builder()`.
#[must_use]
pub struct FunctionTimerBuilder {
    id: Id,
    read: Box<ReadFn>,
    total_time_unit: TimeUnit,
}

impl FunctionTimerBuilder {
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

    /// Registers the timer, or returns the already registered timer with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> FunctionTimer {
        let read = self.read;
        let unit = self.total_time_unit;

        match registry.get_or_create(self.id, move |id| {
            Meter::FunctionTimer(FunctionTimer::new(id, read, unit))
        }) {
            Meter::FunctionTimer(timer) => timer,
            other => FunctionTimer::noop(Arc::clone(other.shared_id())),
        }
    }
}

impl Debug for FunctionTimerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTimerBuilder")
            .field("id", &self.id)
            .field("total_time_unit", &self.total_time_unit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Mutex;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(FunctionTimer: Send, Sync, Clone);

    #[derive(Default)]
    struct Source {
        // (count, total millis)
        totals: Mutex<(f64, f64)>,
    }

    impl Source {
        fn set(&self, count: f64, total_millis: f64) {
            *self.totals.lock().unwrap() = (count, total_millis);
        }
    }

    fn timer_of(source: &Arc<Source>) -> FunctionTimer {
        let builder = FunctionTimer::builder(
            "test",
            source,
            |s| s.totals.lock().unwrap().0,
            |s| s.totals.lock().unwrap().1,
            TimeUnit::Milliseconds,
        );

        FunctionTimer::new(Arc::new(builder.id), builder.read, builder.total_time_unit)
    }

    #[test]
    fn reports_deltas_in_requested_unit() {
        let source = Arc::new(Source::default());
        let timer = timer_of(&source);

        source.set(2.0, 500.0);
        assert_eq!(timer.take(TimeUnit::Seconds), (2.0, 0.5));

        source.set(5.0, 2500.0);
        assert_eq!(timer.count(), 3.0);
        assert_eq!(timer.total_time(TimeUnit::Milliseconds), 2000.0);
        assert_eq!(timer.take(TimeUnit::Seconds), (3.0, 2.0));
        assert_eq!(timer.take(TimeUnit::Seconds), (0.0, 0.0));
    }

    #[test]
    fn dropped_source_reports_nan() {
        let source = Arc::new(Source::default());
        let timer = timer_of(&source);

        drop(source);

        let (count, total) = timer.take(TimeUnit::Seconds);
        assert!(count.is_nan());
        assert!(total.is_nan());
    }

    #[test]
    fn noop_reports_zero() {
        let timer = FunctionTimer::noop(Arc::new(Id::new("test", MeterKind::FunctionTimer)));

        assert!(timer.is_noop());
        assert_eq!(timer.take(TimeUnit::Seconds), (0.0, 0.0));
    }
}
