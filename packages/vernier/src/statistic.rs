use std::fmt::{self, Display};
use std::time::Duration;

/// Which aspect of a meter a measurement describes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum Statistic {
    /// The sum of the amounts recorded.
    Total,
    /// The sum of the durations recorded.
    TotalTime,
    /// Rate per second for calls.
    Count,
    /// The maximum amount recorded.
    Max,
    /// Instantaneous value, such as one reported by a gauge.
    Value,
    /// Undetermined.
    Unknown,
    /// Number of currently active tasks for a long task timer.
    ActiveTasks,
    /// Duration of a running task in a long task timer.
    Duration,
}

impl Statistic {
    /// The representation of the statistic when used as a tag value.
    #[must_use]
    pub fn tag_value(self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::TotalTime => "total_time",
            Self::Count => "count",
            Self::Max => "max",
            Self::Value => "value",
            Self::Unknown => "unknown",
            Self::ActiveTasks => "active_tasks",
            Self::Duration => "duration",
        }
    }
}

impl Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_value())
    }
}

/// One value read from a meter, labelled with the statistic it represents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    statistic: Statistic,
    value: f64,
}

impl Measurement {
    /// Creates a new measurement.
    #[must_use]
    pub fn new(statistic: Statistic, value: f64) -> Self {
        Self { statistic, value }
    }

    /// The statistic this measurement describes.
    #[must_use]
    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    /// The measured value. May be NaN or infinite if the source could not produce a value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// The unit in which an exporter expects time-based statistics to be expressed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TimeUnit {
    /// 10^-9 seconds.
    Nanoseconds,
    /// 10^-6 seconds.
    Microseconds,
    /// 10^-3 seconds.
    Milliseconds,
    /// Seconds.
    Seconds,
}

impl TimeUnit {
    /// Expresses a duration as a fractional amount of this unit.
    #[must_use]
    pub fn convert(self, duration: Duration) -> f64 {
        self.scale_seconds(duration.as_secs_f64())
    }

    /// Expresses an amount of seconds as a fractional amount of this unit.
    #[must_use]
    pub fn scale_seconds(self, seconds: f64) -> f64 {
        seconds * self.per_second()
    }

    /// Expresses an amount of nanoseconds as a fractional amount of this unit.
    #[must_use]
    pub fn scale_nanos(self, nanos: f64) -> f64 {
        nanos / self.nanos_per_unit()
    }

    /// Expresses an amount of this unit as a fractional amount of seconds.
    #[must_use]
    pub fn to_seconds(self, amount: f64) -> f64 {
        amount / self.per_second()
    }

    /// Converts an amount of this unit into a duration.
    ///
    /// Negative and non-finite amounts yield `None`.
    #[must_use]
    pub fn to_duration(self, amount: f64) -> Option<Duration> {
        Duration::try_from_secs_f64(self.to_seconds(amount)).ok()
    }

    // Exact powers of ten, so whole amounts of nanoseconds convert without rounding noise.
    pub(crate) fn nanos_per_unit(self) -> f64 {
        match self {
            Self::Nanoseconds => 1.0,
            Self::Microseconds => 1e3,
            Self::Milliseconds => 1e6,
            Self::Seconds => 1e9,
        }
    }

    fn per_second(self) -> f64 {
        match self {
            Self::Nanoseconds => 1e9,
            Self::Microseconds => 1e6,
            Self::Milliseconds => 1e3,
            Self::Seconds => 1.0,
        }
    }

    /// Lowercase name of the unit, as used in attribute values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common base units for meters that count things.
pub mod base_units {
    /// For bytes.
    pub const BYTES: &str = "bytes";
    /// For rows.
    pub const ROWS: &str = "rows";
    /// For tasks.
    pub const TASKS: &str = "tasks";
    /// For threads.
    pub const THREADS: &str = "threads";
    /// For classes.
    pub const CLASSES: &str = "classes";
    /// For buffers.
    pub const BUFFERS: &str = "buffers";
    /// For events.
    pub const EVENTS: &str = "events";
    /// For files.
    pub const FILES: &str = "files";
    /// For sessions.
    pub const SESSIONS: &str = "sessions";
}
