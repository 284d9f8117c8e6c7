use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use crate::{Id, Meter, MeterKind, MeterRegistry, MeterText, Tag};

type ValueFn = dyn Fn() -> f64 + Send + Sync;

/// Reports an instantaneous value that is read when the gauge is published.
///
/// A gauge does not store values. It holds a function that is called on every publish,
/// either a free-standing closure or a function of an object the gauge refers to weakly.
/// Once a weakly referenced object has been dropped, the gauge reports NaN and exporters
/// skip it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use vernier::{Gauge, MeterRegistry};
///
/// let registry = MeterRegistry::new();
/// let queue_depth = Arc::new(AtomicUsize::new(3));
///
/// let gauge = Gauge::weak_builder("queue.depth", &queue_depth, |depth| {
///     depth.load(Ordering::Relaxed) as f64
/// })
/// .register(&registry);
///
/// assert_eq!(gauge.value(), 3.0);
///
/// drop(queue_depth);
/// assert!(gauge.value().is_nan());
/// ```
#[derive(Clone)]
pub struct Gauge {
    id: Arc<Id>,

    // None if this is a no-op gauge.
    value_fn: Option<Arc<ValueFn>>,
}

impl Gauge {
    /// Starts building a gauge that reports the result of `value_fn`.
    pub fn builder<F>(name: impl Into<MeterText>, value_fn: F) -> GaugeBuilder
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        GaugeBuilder {
            id: Id::new(name, MeterKind::Gauge),
            value_fn: Arc::new(value_fn),
        }
    }

    /// Starts building a gauge that reports a function of `object` for as long as the
    /// object is alive. The gauge does not keep the object alive.
    pub fn weak_builder<T, F>(name: impl Into<MeterText>, object: &Arc<T>, value_fn: F) -> GaugeBuilder
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        let object: Weak<T> = Arc::downgrade(object);

        Self::builder(name, move || {
            object.upgrade().map_or(f64::NAN, |object| value_fn(&object))
        })
    }

    pub(crate) fn new(id: Arc<Id>, value_fn: Arc<ValueFn>) -> Self {
        Self {
            id,
            value_fn: Some(value_fn),
        }
    }

    pub(crate) fn noop(id: Arc<Id>) -> Self {
        Self { id, value_fn: None }
    }

    /// The current value, or NaN if no value can be produced.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value_fn.as_ref().map_or(f64::NAN, |value_fn| value_fn())
    }

    /// The identity of the gauge.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this gauge reports nothing because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.value_fn.is_none()
    }
}

impl Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge")
            .field("id", &self.id)
            .field("noop", &self.is_noop())
            .finish_non_exhaustive()
    }
}

/// Creates instances of [`Gauge`]. Use `Gauge::builder()` or `Gauge::weak_builder()`.
#[must_use]
pub struct GaugeBuilder {
    id: Id,
    value_fn: Arc<ValueFn>,
}

impl GaugeBuilder {
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

    /// Sets the unit of the reported value.
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

    /// Registers the gauge, or returns the already registered gauge with the same identity.
    ///
    /// If a gauge with the same identity already exists, the value function of this builder
    /// is discarded and the existing gauge keeps reporting its own.
    pub fn register(self, registry: &MeterRegistry) -> Gauge {
        let value_fn = self.value_fn;

        match registry.get_or_create(self.id, move |id| Meter::Gauge(Gauge::new(id, value_fn))) {
            Meter::Gauge(gauge) => gauge,
            other => Gauge::noop(Arc::clone(other.shared_id())),
        }
    }
}

impl Debug for GaugeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaugeBuilder")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
