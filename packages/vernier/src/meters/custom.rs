use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::{Id, Measurement, Meter, MeterKind, MeterRegistry, MeterText, Tag};

type MeasureFn = dyn Fn() -> Vec<Measurement> + Send + Sync;

/// A meter of no predefined kind, described entirely by the measurements its function
/// returns on every publish.
///
/// Use this to bridge values from other instrumentation libraries that do not map onto
/// one of the built-in meter kinds. Exporters render each measurement according to its
/// statistic.
///
/// # Example
///
/// ```
/// use vernier::{CustomMeter, Measurement, MeterRegistry, Statistic};
///
/// let registry = MeterRegistry::new();
///
/// let meter = CustomMeter::builder("legacy.pool", || {
///     vec![
///         Measurement::new(Statistic::Value, 12.0),
///         Measurement::new(Statistic::Total, 300.0),
///     ]
/// })
/// .register(&registry);
///
/// assert_eq!(meter.measure().len(), 2);
/// ```
#[derive(Clone)]
pub struct CustomMeter {
    id: Arc<Id>,

    // None if this is a no-op meter.
    measure_fn: Option<Arc<MeasureFn>>,
}

impl CustomMeter {
    /// Starts building a meter that reports the measurements returned by `measure_fn`.
    pub fn builder<F>(name: impl Into<MeterText>, measure_fn: F) -> CustomMeterBuilder
    where
        F: Fn() -> Vec<Measurement> + Send + Sync + 'static,
    {
        CustomMeterBuilder {
            id: Id::new(name, MeterKind::Other),
            measure_fn: Arc::new(measure_fn),
        }
    }

    pub(crate) fn new(id: Arc<Id>, measure_fn: Arc<MeasureFn>) -> Self {
        Self {
            id,
            measure_fn: Some(measure_fn),
        }
    }

    pub(crate) fn noop(id: Arc<Id>) -> Self {
        Self {
            id,
            measure_fn: None,
        }
    }

    /// The current measurements. A no-op meter has none.
    #[must_use]
    pub fn measure(&self) -> Vec<Measurement> {
        self.measure_fn
            .as_ref()
            .map_or_else(Vec::new, |measure_fn| measure_fn())
    }

    /// The identity of the meter.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this meter reports nothing because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.measure_fn.is_none()
    }
}

impl Debug for CustomMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMeter")
            .field("id", &self.id)
            .field("noop", &self.is_noop())
            .finish_non_exhaustive()
    }
}

/// Creates instances of [`CustomMeter`]. Use `CustomMeter::builder()`.
#[must_use]
pub struct CustomMeterBuilder {
    id: Id,
    measure_fn: Arc<MeasureFn>,
}

impl CustomMeterBuilder {
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

    /// Sets the unit of the measured values.
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

    /// Registers the meter, or returns the already registered meter with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> CustomMeter {
        let measure_fn = self.measure_fn;

        match registry.get_or_create(self.id, move |id| {
            Meter::Custom(CustomMeter::new(id, measure_fn))
        }) {
            Meter::Custom(meter) => meter,
            other => CustomMeter::noop(Arc::clone(other.shared_id())),
        }
    }
}

impl Debug for CustomMeterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMeterBuilder")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
