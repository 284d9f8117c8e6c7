use std::sync::atomic::{self, AtomicU64};

/// We use `Relaxed` ordering for all meter state because measurement must be as cheap as
/// possible. Each field is independently consistent; readers must not assume consistency
/// between different fields of the same meter (e.g. count and total may be torn).
pub(crate) const METER_ACCESS_ORDERING: atomic::Ordering = atomic::Ordering::Relaxed;

/// Converts a count or a nanosecond amount into a measurement value.
#[expect(
    clippy::cast_precision_loss,
    reason = "precision loss only above 2^53, far beyond any count or duration seen in one step"
)]
pub(crate) fn u64_to_f64(value: u64) -> f64 {
    value as f64
}

/// An `f64` that can be updated concurrently, stored as its bit pattern.
#[derive(Debug)]
pub(crate) struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(METER_ACCESS_ORDERING))
    }

    pub(crate) fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), METER_ACCESS_ORDERING);
    }

    /// Replaces the value, returning the previous one. A concurrent `add()` is either
    /// fully included in the returned value or fully applied to the new one.
    pub(crate) fn swap(&self, value: f64) -> f64 {
        f64::from_bits(self.bits.swap(value.to_bits(), METER_ACCESS_ORDERING))
    }

    pub(crate) fn add(&self, delta: f64) {
        self.update(|current| current + delta);
    }

    /// Raises the value to `candidate` if `candidate` is greater.
    pub(crate) fn fetch_max(&self, candidate: f64) {
        let mut current = self.bits.load(METER_ACCESS_ORDERING);

        while f64::from_bits(current) < candidate {
            match self.bits.compare_exchange_weak(
                current,
                candidate.to_bits(),
                METER_ACCESS_ORDERING,
                METER_ACCESS_ORDERING,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.bits.load(METER_ACCESS_ORDERING);

        loop {
            let next = f(f64::from_bits(current)).to_bits();

            match self.bits.compare_exchange_weak(
                current,
                next,
                METER_ACCESS_ORDERING,
                METER_ACCESS_ORDERING,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
