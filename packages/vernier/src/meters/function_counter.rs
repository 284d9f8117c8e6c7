use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use crate::atomics::AtomicF64;
use crate::{Id, Measurement, Meter, MeterKind, MeterRegistry, MeterText, Statistic, Tag};

type ReadFn = dyn Fn() -> Option<f64> + Send + Sync;

/// A counter whose value is maintained by some other object, such as a cumulative
/// statistic kept by a connection pool.
///
/// The function must return a monotonically increasing total. On every publish the
/// counter reports the increase since the previous publish. The object is referenced
/// weakly; once it has been dropped, the counter reports NaN and exporters skip it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// use vernier::{FunctionCounter, MeterRegistry};
///
/// let registry = MeterRegistry::new();
/// let evictions = Arc::new(AtomicU64::new(0));
///
/// let counter = FunctionCounter::builder("cache.evictions", &evictions, |e| {
///     e.load(Ordering::Relaxed) as f64
/// })
/// .register(&registry);
///
/// evictions.fetch_add(3, Ordering::Relaxed);
/// assert_eq!(counter.count(), 3.0);
/// ```
#[derive(Clone)]
pub struct FunctionCounter {
    id: Arc<Id>,

    // None if this is a no-op counter.
    state: Option<Arc<FunctionCounterState>>,
}

struct FunctionCounterState {
    // Returns None once the source object has been dropped.
    read: Box<ReadFn>,

    // The cumulative value reported by the source at the previous publish.
    baseline: AtomicF64,
}

impl FunctionCounter {
    /// Starts building a counter that reports the increase of `total_fn(object)`.
    pub fn builder<T, F>(
        name: impl Into<MeterText>,
        object: &Arc<T>,
        total_fn: F,
    ) -> FunctionCounterBuilder
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        let object: Weak<T> = Arc::downgrade(object);

        FunctionCounterBuilder {
            id: Id::new(name, MeterKind::FunctionCounter),
            read: Box::new(move || object.upgrade().map(|object| total_fn(&object))),
        }
    }

    pub(crate) fn new(id: Arc<Id>, read: Box<ReadFn>) -> Self {
        Self {
            id,
            state: Some(Arc::new(FunctionCounterState {
                read,
                baseline: AtomicF64::default(),
            })),
        }
    }

    pub(crate) fn noop(id: Arc<Id>) -> Self {
        Self { id, state: None }
    }

    /// The increase since the last publish, or NaN if the source object has been dropped.
    #[must_use]
    pub fn count(&self) -> f64 {
        let Some(state) = &self.state else {
            return 0.0;
        };

        (state.read)().map_or(f64::NAN, |current| {
            (current - state.baseline.load()).max(0.0)
        })
    }

    /// The identity of the counter.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this counter reports nothing because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.state.is_none()
    }

    pub(crate) fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }

    /// Reads the increase since the last publish and advances the baseline.
    pub(crate) fn take(&self) -> f64 {
        let Some(state) = &self.state else {
            return 0.0;
        };

        (state.read)().map_or(f64::NAN, |current| advance(&state.baseline, current))
    }
}

/// Moves `baseline` to `current`, returning the increase. A source that went backwards
/// (e.g. was reset) yields zero and the baseline follows it down.
pub(crate) fn advance(baseline: &AtomicF64, current: f64) -> f64 {
    if !current.is_finite() {
        return f64::NAN;
    }

    (current - baseline.swap(current)).max(0.0)
}

impl Debug for FunctionCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCounter")
            .field("id", &self.id)
            .field("noop", &self.is_noop())
            .finish_non_exhaustive()
    }
}

/// Creates instances of [`FunctionCounter`]. Use `FunctionCounter::builder()`.
#[must_use]
pub struct FunctionCounterBuilder {
    id: Id,
    read: Box<ReadFn>,
}

impl FunctionCounterBuilder {
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

    /// Sets the unit of the counted amounts.
    pub fn base_unit(self, base_unit: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_base_unit(base_unit),
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

    /// Registers the counter, or returns the already registered counter with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> FunctionCounter {
        let read = self.read;

        match registry.get_or_create(self.id, move |id| {
            Meter::FunctionCounter(FunctionCounter::new(id, read))
        }) {
            Meter::FunctionCounter(counter) => counter,
            other => FunctionCounter::noop(Arc::clone(other.shared_id())),
        }
    }
}

impl Debug for FunctionCounterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCounterBuilder")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
