use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::atomics::{AtomicF64, METER_ACCESS_ORDERING, u64_to_f64};
use crate::meters::histogram::Histogram;
use crate::{
    Id, Measurement, Meter, MeterKind, MeterRegistry, MeterSnapshot, MeterText, Statistic, Tag,
};

/// Records the count, total and maximum of amounts that are not durations, such as
/// payload sizes.
///
/// Like a timer, the statistics are step-scoped. Recorded amounts are multiplied by the
/// scale factor of the summary before they are accumulated, which allows e.g. recording
/// kilobytes while reporting bytes.
///
/// # Example
///
/// ```
/// use vernier::{DistributionSummary, MeterRegistry, base_units};
///
/// let registry = MeterRegistry::new();
///
/// let sizes = DistributionSummary::builder("http.response.size")
///     .base_unit(base_units::BYTES)
///     .scale(1024.0)
///     .register(&registry);
///
/// sizes.record(2.0);
/// sizes.record(0.5);
///
/// assert_eq!(sizes.count(), 2);
/// assert_eq!(sizes.total_amount(), 2560.0);
/// assert_eq!(sizes.max(), 2048.0);
/// ```
#[derive(Clone, Debug)]
pub struct DistributionSummary {
    id: Arc<Id>,

    // None if this is a no-op summary.
    state: Option<Arc<SummaryState>>,
}

#[derive(Debug)]
struct SummaryState {
    scale: f64,
    count: AtomicU64,
    total: AtomicF64,
    max: AtomicF64,

    // Upper bounds in scaled units.
    histogram: Option<Histogram>,
}

impl DistributionSummary {
    /// Starts building a distribution summary with the given name.
    #[must_use]
    pub fn builder(name: impl Into<MeterText>) -> DistributionSummaryBuilder {
        DistributionSummaryBuilder {
            id: Id::new(name, MeterKind::DistributionSummary),
            scale: 1.0,
            buckets: Vec::new(),
        }
    }

    pub(crate) fn new(id: Arc<Id>, scale: f64, buckets: &[f64]) -> Self {
        Self {
            id,
            state: Some(Arc::new(SummaryState {
                scale,
                count: AtomicU64::new(0),
                total: AtomicF64::default(),
                max: AtomicF64::default(),
                histogram: Histogram::new(buckets),
            })),
        }
    }

    pub(crate) fn noop(id: Arc<Id>) -> Self {
        Self { id, state: None }
    }

    /// Records one amount. Negative and non-finite amounts are ignored.
    pub fn record(&self, amount: f64) {
        let Some(state) = &self.state else {
            return;
        };

        let scaled = amount * state.scale;

        if !scaled.is_finite() || scaled < 0.0 {
            return;
        }

        state.count.fetch_add(1, METER_ACCESS_ORDERING);
        state.total.add(scaled);
        state.max.fetch_max(scaled);

        if let Some(histogram) = &state.histogram {
            histogram.record(scaled);
        }
    }

    /// Number of amounts recorded since the last publish.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |state| state.count.load(METER_ACCESS_ORDERING))
    }

    /// Sum of the scaled amounts recorded since the last publish.
    #[must_use]
    pub fn total_amount(&self) -> f64 {
        self.state.as_ref().map_or(0.0, |state| state.total.load())
    }

    /// Largest scaled amount recorded since the last publish.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.state.as_ref().map_or(0.0, |state| state.max.load())
    }

    /// Average of the scaled amounts recorded since the last publish, zero if there were none.
    #[must_use]
    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            count => self.total_amount() / u64_to_f64(count),
        }
    }

    /// The identity of the summary.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this summary discards all writes because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.state.is_none()
    }

    pub(crate) fn measure(&self) -> Vec<Measurement> {
        measurements(self.count(), self.total_amount(), self.max())
    }

    pub(crate) fn take_snapshot(&self) -> MeterSnapshot {
        let Some(state) = &self.state else {
            return MeterSnapshot::new(measurements(0, 0.0, 0.0));
        };

        let count = state.count.swap(0, METER_ACCESS_ORDERING);
        let total = state.total.swap(0.0);
        let max = state.max.swap(0.0);

        let snapshot = MeterSnapshot::new(measurements(count, total, max));

        match &state.histogram {
            Some(histogram) => snapshot.with_histogram(histogram.take(1.0)),
            None => snapshot,
        }
    }
}

fn measurements(count: u64, total: f64, max: f64) -> Vec<Measurement> {
    vec![
        Measurement::new(Statistic::Count, u64_to_f64(count)),
        Measurement::new(Statistic::Total, total),
        Measurement::new(Statistic::Max, max),
    ]
}

/// Creates instances of [`DistributionSummary`]. Use `DistributionSummary::builder()`.
#[derive(Debug)]
#[must_use]
pub struct DistributionSummaryBuilder {
    id: Id,
    scale: f64,
    buckets: Vec<f64>,
}

impl DistributionSummaryBuilder {
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

    /// Sets the unit of the recorded amounts, e.g. [`base_units::BYTES`][crate::base_units::BYTES].
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

    /// Multiplies every recorded amount by `scale`. Defaults to 1.
    pub fn scale(self, scale: f64) -> Self {
        Self { scale, ..self }
    }

    /// Counts scaled amounts into histogram buckets with the given inclusive upper bounds.
    pub fn buckets(self, upper_bounds: &[f64]) -> Self {
        Self {
            buckets: upper_bounds.to_vec(),
            ..self
        }
    }

    /// Registers the summary, or returns the already registered summary with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> DistributionSummary {
        let scale = self.scale;
        let buckets = self.buckets;

        match registry.get_or_create(self.id, |id| {
            Meter::DistributionSummary(DistributionSummary::new(id, scale, &buckets))
        }) {
            Meter::DistributionSummary(summary) => summary,
            other => DistributionSummary::noop(Arc::clone(other.shared_id())),
        }
    }
}
