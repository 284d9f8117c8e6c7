use std::fmt::Debug;
use std::time::{Duration, Instant, SystemTime};

/// A source of time for meters and publishers.
///
/// Timers use the monotonic reading to measure elapsed time, publishers use the wall clock
/// reading to align their publishing schedule with step boundaries. Both can be replaced in
/// tests to control time progression without real delays.
pub trait Clock: Debug + Send + Sync + 'static {
    /// A monotonic timestamp, used to measure durations.
    fn now(&self) -> Instant;

    /// Time elapsed since the Unix epoch, used to align publishing to step boundaries.
    fn wall_time(&self) -> Duration;
}

/// Clock implementation using the operating system clocks.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> Duration {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-util"))]
mod manual {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    use super::Clock;

    /// A clock that only moves when told to.
    ///
    /// Clones share the same time, so a clone can be handed to a registry while the test
    /// keeps another to advance it.
    ///
    /// Only available with the `test-util` feature.
    #[derive(Clone, Debug)]
    pub struct ManualClock {
        origin: Instant,
        elapsed_nanos: Arc<AtomicU64>,
        wall_nanos: Arc<AtomicU64>,
    }

    impl ManualClock {
        /// Creates a clock whose wall time starts at the Unix epoch.
        #[must_use]
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                elapsed_nanos: Arc::new(AtomicU64::new(0)),
                wall_nanos: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Moves both the monotonic and the wall clock forward.
        pub fn advance(&self, duration: Duration) {
            let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);

            self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
            self.wall_nanos.fetch_add(nanos, Ordering::Relaxed);
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed))
        }

        fn wall_time(&self) -> Duration {
            Duration::from_nanos(self.wall_nanos.load(Ordering::Relaxed))
        }
    }
}
