use std::sync::Arc;

use crate::{
    Clock, Counter, CustomMeter, DistributionSummary, FunctionCounter, FunctionTimer, Gauge,
    HistogramSnapshot, Id, LongTaskTimer, Measurement, MeterKind, Statistic, TimeUnit, Timer,
};

/// A registered meter of any kind.
///
/// This is what the registry stores and what exporters iterate over. Exporters match on
/// the variant to decide how to render each kind.
#[derive(Clone, Debug)]
#[expect(
    clippy::exhaustive_enums,
    reason = "exporters match on every kind; a new kind must be a compile error for them"
)]
pub enum Meter {
    /// See [`Counter`].
    Counter(Counter),
    /// See [`Gauge`].
    Gauge(Gauge),
    /// See [`Timer`].
    Timer(Timer),
    /// See [`DistributionSummary`].
    DistributionSummary(DistributionSummary),
    /// See [`LongTaskTimer`].
    LongTaskTimer(LongTaskTimer),
    /// See [`FunctionCounter`].
    FunctionCounter(FunctionCounter),
    /// See [`FunctionTimer`].
    FunctionTimer(FunctionTimer),
    /// See [`CustomMeter`].
    Custom(CustomMeter),
}

impl Meter {
    /// Creates a meter of the kind named by `id` that discards all writes.
    pub(crate) fn noop(id: Arc<Id>, clock: Arc<dyn Clock>) -> Self {
        match id.kind() {
            MeterKind::Counter => Self::Counter(Counter::noop(id)),
            MeterKind::Gauge => Self::Gauge(Gauge::noop(id)),
            MeterKind::Timer => Self::Timer(Timer::noop(id, clock)),
            MeterKind::DistributionSummary => {
                Self::DistributionSummary(DistributionSummary::noop(id))
            }
            MeterKind::LongTaskTimer => Self::LongTaskTimer(LongTaskTimer::noop(id, clock)),
            MeterKind::FunctionCounter => Self::FunctionCounter(FunctionCounter::noop(id)),
            MeterKind::FunctionTimer => Self::FunctionTimer(FunctionTimer::noop(id)),
            MeterKind::Other => Self::Custom(CustomMeter::noop(id)),
        }
    }

    /// The identity of the meter.
    #[must_use]
    pub fn id(&self) -> &Id {
        self.shared_id()
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        match self {
            Self::Counter(m) => m.shared_id(),
            Self::Gauge(m) => m.shared_id(),
            Self::Timer(m) => m.shared_id(),
            Self::DistributionSummary(m) => m.shared_id(),
            Self::LongTaskTimer(m) => m.shared_id(),
            Self::FunctionCounter(m) => m.shared_id(),
            Self::FunctionTimer(m) => m.shared_id(),
            Self::Custom(m) => m.shared_id(),
        }
    }

    /// The kind of the meter.
    #[must_use]
    pub fn kind(&self) -> MeterKind {
        self.id().kind()
    }

    /// Whether the meter discards all writes because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Counter(m) => m.is_noop(),
            Self::Gauge(m) => m.is_noop(),
            Self::Timer(m) => m.is_noop(),
            Self::DistributionSummary(m) => m.is_noop(),
            Self::LongTaskTimer(m) => m.is_noop(),
            Self::FunctionCounter(m) => m.is_noop(),
            Self::FunctionTimer(m) => m.is_noop(),
            Self::Custom(m) => m.is_noop(),
        }
    }

    /// Reads the current measurements without resetting anything. Time-based statistics
    /// are expressed in `unit`.
    #[must_use]
    pub fn measure(&self, unit: TimeUnit) -> Vec<Measurement> {
        match self {
            Self::Counter(m) => vec![Measurement::new(Statistic::Count, m.count())],
            Self::Gauge(m) => vec![Measurement::new(Statistic::Value, m.value())],
            Self::Timer(m) => m.measure(unit),
            Self::DistributionSummary(m) => m.measure(),
            Self::LongTaskTimer(m) => m.measure(unit),
            Self::FunctionCounter(m) => m.measure(),
            Self::FunctionTimer(m) => m.measure(unit),
            Self::Custom(m) => m.measure(),
        }
    }

    /// Reads the measurements for one publish and resets step-scoped state, so the next
    /// snapshot only reflects what is recorded after this one.
    pub(crate) fn take_snapshot(&self, unit: TimeUnit) -> MeterSnapshot {
        match self {
            Self::Counter(m) => {
                MeterSnapshot::new(vec![Measurement::new(Statistic::Count, m.take())])
            }
            Self::Gauge(m) => {
                MeterSnapshot::new(vec![Measurement::new(Statistic::Value, m.value())])
            }
            Self::Timer(m) => m.take_snapshot(unit),
            Self::DistributionSummary(m) => m.take_snapshot(),
            Self::LongTaskTimer(m) => MeterSnapshot::new(m.measure(unit)),
            Self::FunctionCounter(m) => {
                MeterSnapshot::new(vec![Measurement::new(Statistic::Count, m.take())])
            }
            Self::FunctionTimer(m) => {
                let (count, total_time) = m.take(unit);

                MeterSnapshot::new(vec![
                    Measurement::new(Statistic::Count, count),
                    Measurement::new(Statistic::TotalTime, total_time),
                ])
            }
            Self::Custom(m) => MeterSnapshot::new(m.measure()),
        }
    }
}

/// The measurements of one meter for one publish.
///
/// Exporters receive one snapshot per meter per publish and render it into their wire
/// format. Time-based statistics are already expressed in the exporter's base time unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeterSnapshot {
    measurements: Vec<Measurement>,
    histogram: Option<HistogramSnapshot>,
}

impl MeterSnapshot {
    /// Creates a snapshot from measurements.
    #[must_use]
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements,
            histogram: None,
        }
    }

    /// Attaches histogram buckets to the snapshot.
    #[must_use]
    pub fn with_histogram(self, histogram: HistogramSnapshot) -> Self {
        Self {
            histogram: Some(histogram),
            ..self
        }
    }

    /// The measurements, in the order the meter kind defines.
    #[must_use]
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// The value of the first measurement of the given statistic, if any.
    #[must_use]
    pub fn value(&self, statistic: Statistic) -> Option<f64> {
        self.measurements
            .iter()
            .find(|m| m.statistic() == statistic)
            .map(Measurement::value)
    }

    /// Histogram buckets, if the meter has a histogram.
    #[must_use]
    pub fn histogram(&self) -> Option<&HistogramSnapshot> {
        self.histogram.as_ref()
    }

    /// Whether at least one measurement has a finite value. Snapshots without any are not
    /// worth exporting (e.g. a gauge whose object has been dropped).
    #[must_use]
    pub fn has_finite_values(&self) -> bool {
        self.measurements.iter().any(|m| m.value().is_finite())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::ManualClock;

    assert_impl_all!(Meter: Send, Sync, Clone);
    assert_impl_all!(MeterSnapshot: Send, Sync);

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new())
    }

    #[test]
    fn noop_matches_requested_kind() {
        let kinds = [
            MeterKind::Counter,
            MeterKind::Gauge,
            MeterKind::Timer,
            MeterKind::DistributionSummary,
            MeterKind::LongTaskTimer,
            MeterKind::FunctionCounter,
            MeterKind::FunctionTimer,
            MeterKind::Other,
        ];

        for kind in kinds {
            let meter = Meter::noop(Arc::new(Id::new("x", kind)), clock());

            assert_eq!(meter.kind(), kind);
            assert!(meter.is_noop());
        }
    }

    #[test]
    fn counter_snapshot_resets_but_gauge_does_not() {
        let counter = Counter::new(Arc::new(Id::new("c", MeterKind::Counter)));
        let gauge = Gauge::new(Arc::new(Id::new("g", MeterKind::Gauge)), Arc::new(|| 5.0));
        let counter_meter = Meter::Counter(counter.clone());
        let gauge_meter = Meter::Gauge(gauge);

        counter.increment_by(2.0);

        assert_eq!(
            counter_meter
                .take_snapshot(TimeUnit::Seconds)
                .value(Statistic::Count),
            Some(2.0)
        );
        assert_eq!(
            counter_meter
                .take_snapshot(TimeUnit::Seconds)
                .value(Statistic::Count),
            Some(0.0)
        );

        for _ in 0..2 {
            assert_eq!(
                gauge_meter
                    .take_snapshot(TimeUnit::Seconds)
                    .value(Statistic::Value),
                Some(5.0)
            );
        }
    }

    #[test]
    fn measure_does_not_reset() {
        let counter = Counter::new(Arc::new(Id::new("c", MeterKind::Counter)));
        let meter = Meter::Counter(counter.clone());
        counter.increment();

        _ = meter.measure(TimeUnit::Seconds);

        assert_eq!(
            meter.measure(TimeUnit::Seconds),
            [Measurement::new(Statistic::Count, 1.0)]
        );
    }

    #[test]
    fn finite_values() {
        let nan = MeterSnapshot::new(vec![Measurement::new(Statistic::Value, f64::NAN)]);
        let mixed = MeterSnapshot::new(vec![
            Measurement::new(Statistic::Count, f64::INFINITY),
            Measurement::new(Statistic::Total, 1.0),
        ]);

        assert!(!nan.has_finite_values());
        assert!(mixed.has_finite_values());
        assert!(!MeterSnapshot::default().has_finite_values());
    }
}
