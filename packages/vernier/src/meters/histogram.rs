use std::iter;
use std::sync::atomic::AtomicU64;

use crate::atomics::METER_ACCESS_ORDERING;

/// Fixed-boundary histogram of recorded values.
///
/// Each bucket counts the values that are less than or equal to its upper bound and greater
/// than the previous bucket's upper bound. Values above the last bound are not counted in
/// any bucket - they are only visible in the total count of the owning meter.
#[derive(Debug)]
pub(crate) struct Histogram {
    // Ascending, finite, no duplicates.
    upper_bounds: Box<[f64]>,

    // Same length as `upper_bounds`.
    counts: Box<[AtomicU64]>,
}

impl Histogram {
    /// Creates a histogram, normalizing the bounds by sorting them and dropping duplicates
    /// and non-finite values. Returns `None` if no usable bounds remain.
    pub(crate) fn new(upper_bounds: &[f64]) -> Option<Self> {
        let mut bounds = upper_bounds
            .iter()
            .copied()
            .filter(|bound| bound.is_finite())
            .collect::<Vec<_>>();

        bounds.sort_by(f64::total_cmp);
        bounds.dedup();

        if bounds.is_empty() {
            return None;
        }

        let counts = iter::repeat_with(|| AtomicU64::new(0))
            .take(bounds.len())
            .collect();

        Some(Self {
            upper_bounds: bounds.into_boxed_slice(),
            counts,
        })
    }

    pub(crate) fn record(&self, value: f64) {
        // Linear scan: bucket lists are short and sorted, so branch prediction does well here.
        let bucket = self
            .upper_bounds
            .iter()
            .position(|&bound| value <= bound)
            .and_then(|index| self.counts.get(index));

        if let Some(count) = bucket {
            count.fetch_add(1, METER_ACCESS_ORDERING);
        }
    }

    /// Reads the bucket counts and resets them to zero. Upper bounds are divided by
    /// `divisor`.
    pub(crate) fn take(&self, divisor: f64) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self
                .upper_bounds
                .iter()
                .zip(self.counts.iter())
                .map(|(&upper_bound, count)| Bucket {
                    upper_bound: upper_bound / divisor,
                    count: count.swap(0, METER_ACCESS_ORDERING),
                })
                .collect(),
        }
    }
}

/// The bucket counts of a histogram at one point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramSnapshot {
    buckets: Vec<Bucket>,
}

impl HistogramSnapshot {
    /// The buckets, in ascending order of upper bound.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// The buckets with counts accumulated, so each bucket also counts every value
    /// counted by the buckets before it (Prometheus-style `le` buckets).
    pub fn cumulative(&self) -> impl Iterator<Item = Bucket> {
        self.buckets.iter().scan(0_u64, |running, bucket| {
            *running = running.saturating_add(bucket.count);

            Some(Bucket {
                upper_bound: bucket.upper_bound,
                count: *running,
            })
        })
    }
}

/// One bucket of a [`HistogramSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bucket {
    upper_bound: f64,
    count: u64,
}

impl Bucket {
    /// Inclusive upper bound of the bucket, in the unit of the owning snapshot.
    #[must_use]
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Number of values in the bucket.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}
