use std::sync::Arc;

use crate::atomics::AtomicF64;
use crate::{Id, Meter, MeterKind, MeterRegistry, MeterText, Tag};

/// Counts occurrences of something, accumulating over one publishing step.
///
/// The publisher reads and resets the count at the end of every step, so the value seen by
/// a backend is the amount accumulated since the previous publish.
///
/// # Example
///
/// ```
/// use vernier::{Counter, MeterRegistry};
///
/// let registry = MeterRegistry::new();
///
/// let requests = Counter::builder("http.requests")
///     .tag("method", "GET")
///     .register(&registry);
///
/// requests.increment();
/// requests.increment_by(4.0);
///
/// assert_eq!(requests.count(), 5.0);
/// ```
///
/// # Thread safety
///
/// Handles are cheap to clone and all clones update the same count. Any number of threads
/// may increment concurrently; increments never block.
#[derive(Clone, Debug)]
pub struct Counter {
    id: Arc<Id>,

    // None if this is a no-op counter (registration was denied by a filter).
    count: Option<Arc<AtomicF64>>,
}

impl Counter {
    /// Starts building a counter with the given name.
    #[must_use]
    pub fn builder(name: impl Into<MeterText>) -> CounterBuilder {
        CounterBuilder {
            id: Id::new(name, MeterKind::Counter),
        }
    }

    pub(crate) fn new(id: Arc<Id>) -> Self {
        Self {
            id,
            count: Some(Arc::new(AtomicF64::default())),
        }
    }

    pub(crate) fn noop(id: Arc<Id>) -> Self {
        Self { id, count: None }
    }

    /// Adds one to the count.
    #[inline]
    pub fn increment(&self) {
        self.increment_by(1.0);
    }

    /// Adds `amount` to the count.
    ///
    /// Negative and non-finite amounts are ignored: a counter never goes backwards.
    #[inline]
    pub fn increment_by(&self, amount: f64) {
        if let Some(count) = &self.count {
            if amount.is_finite() && amount >= 0.0 {
                count.add(amount);
            }
        }
    }

    /// The amount accumulated since the last publish.
    #[must_use]
    pub fn count(&self) -> f64 {
        self.count.as_ref().map_or(0.0, |count| count.load())
    }

    /// The identity of the counter.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this counter discards all writes because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.count.is_none()
    }

    /// Reads and resets the count. Increments racing with this call land either in the
    /// returned value or in the next one, never in neither.
    pub(crate) fn take(&self) -> f64 {
        self.count.as_ref().map_or(0.0, |count| count.swap(0.0))
    }
}

/// Creates instances of [`Counter`]. Use `Counter::builder()` to create a new instance.
#[derive(Debug)]
#[must_use]
pub struct CounterBuilder {
    id: Id,
}

impl CounterBuilder {
    /// Adds a tag, replacing any existing tag with the same key.
    pub fn tag(self, key: impl Into<MeterText>, value: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_tag(key, value),
        }
    }

    /// Adds tags, replacing any existing tags with the same keys.
    pub fn tags(self, tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            id: self.id.with_tags(tags),
        }
    }

    /// Sets the unit of the counted amounts, e.g. [`base_units::BYTES`][crate::base_units::BYTES].
    pub fn base_unit(self, base_unit: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_base_unit(base_unit),
        }
    }

    /// Sets a human-readable description.
    pub fn description(self, description: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_description(description),
        }
    }

    /// Registers the counter, or returns the already registered counter with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> Counter {
        match registry.get_or_create(self.id, |id| Meter::Counter(Counter::new(id))) {
            Meter::Counter(counter) => counter,
            other => Counter::noop(Arc::clone(other.shared_id())),
        }
    }
}
