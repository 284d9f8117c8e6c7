use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use crate::atomics::{METER_ACCESS_ORDERING, u64_to_f64};
use crate::{
    Clock, Id, Measurement, Meter, MeterKind, MeterRegistry, MeterText, Statistic, Tag, TimeUnit,
};

/// Tracks tasks that are still running, such as a long-running batch job.
///
/// Unlike a [`Timer`][crate::Timer], which only learns about an operation once it completes,
/// a long task timer reports the number of tasks in progress and their combined running
/// time on every publish. Its state is not reset by publishing.
///
/// # Example
///
/// ```
/// use vernier::{LongTaskTimer, MeterRegistry};
///
/// let registry = MeterRegistry::new();
/// let migrations = LongTaskTimer::builder("schema.migration").register(&registry);
///
/// let task = migrations.start();
/// assert_eq!(migrations.active_tasks(), 1);
///
/// let elapsed = task.stop();
/// assert!(elapsed.is_some());
/// assert_eq!(migrations.active_tasks(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct LongTaskTimer {
    id: Arc<Id>,
    clock: Arc<dyn Clock>,

    // None if this is a no-op timer.
    state: Option<Arc<LongTaskState>>,
}

#[derive(Debug)]
struct LongTaskState {
    next_task: AtomicU64,
    active: scc::HashMap<u64, Instant>,
}

impl LongTaskTimer {
    /// Starts building a long task timer with the given name.
    #[must_use]
    pub fn builder(name: impl Into<MeterText>) -> LongTaskTimerBuilder {
        LongTaskTimerBuilder {
            id: Id::new(name, MeterKind::LongTaskTimer),
        }
    }

    pub(crate) fn new(id: Arc<Id>, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            clock,
            state: Some(Arc::new(LongTaskState {
                next_task: AtomicU64::new(0),
                active: scc::HashMap::new(),
            })),
        }
    }

    pub(crate) fn noop(id: Arc<Id>, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            clock,
            state: None,
        }
    }

    /// Marks the start of a task. The returned sample stops the task when asked to.
    pub fn start(&self) -> LongTaskSample {
        let task = self.state.as_ref().map_or(0, |state| {
            let task = state.next_task.fetch_add(1, METER_ACCESS_ORDERING);

            // Task identifiers are never reused, so the insert cannot collide.
            _ = state.active.insert(task, self.clock.now());

            task
        });

        LongTaskSample {
            timer: self.clone(),
            task,
        }
    }

    /// Marks the end of a task, returning how long it ran.
    ///
    /// Returns `None` if the task is not active, e.g. because it was already stopped.
    pub fn stop(&self, task: u64) -> Option<Duration> {
        let (_, started) = self.state.as_ref()?.active.remove(&task)?;

        Some(self.clock.now().saturating_duration_since(started))
    }

    /// How long the task has been running, or `None` if the task is not active.
    #[must_use]
    pub fn duration(&self, task: u64) -> Option<Duration> {
        let now = self.clock.now();

        self.state
            .as_ref()?
            .active
            .read(&task, |_, started| now.saturating_duration_since(*started))
    }

    /// Number of tasks currently running.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.active.len())
    }

    /// Combined running time of all tasks currently running.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        let Some(state) = &self.state else {
            return Duration::ZERO;
        };

        let now = self.clock.now();
        let mut total = Duration::ZERO;

        state.active.scan(|_, started| {
            total = total.saturating_add(now.saturating_duration_since(*started));
        });

        total
    }

    /// The identity of the timer.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> &Arc<Id> {
        &self.id
    }

    /// Whether this timer tracks nothing because its registration was denied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.state.is_none()
    }

    pub(crate) fn measure(&self, unit: TimeUnit) -> Vec<Measurement> {
        let active = u64::try_from(self.active_tasks()).unwrap_or(u64::MAX);

        vec![
            Measurement::new(Statistic::ActiveTasks, u64_to_f64(active)),
            Measurement::new(Statistic::Duration, unit.convert(self.total_duration())),
        ]
    }
}

/// A task being tracked by a [`LongTaskTimer`]. Created by [`LongTaskTimer::start`].
///
/// Dropping the sample without stopping it leaves the task active.
#[derive(Debug)]
#[must_use = "the task stays active until the sample is stopped"]
pub struct LongTaskSample {
    timer: LongTaskTimer,
    task: u64,
}

impl LongTaskSample {
    /// The identifier of the task, for use with [`LongTaskTimer::stop`].
    #[must_use]
    pub fn task(&self) -> u64 {
        self.task
    }

    /// How long the task has been running, or `None` if it has already been stopped.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.timer.duration(self.task)
    }

    /// Marks the end of the task, returning how long it ran.
    pub fn stop(self) -> Option<Duration> {
        self.timer.stop(self.task)
    }
}

/// Creates instances of [`LongTaskTimer`]. Use `LongTaskTimer::builder()`.
#[derive(Debug)]
#[must_use]
pub struct LongTaskTimerBuilder {
    id: Id,
}

impl LongTaskTimerBuilder {
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

    /// Sets a human-readable description.
    pub fn description(self, description: impl Into<MeterText>) -> Self {
        Self {
            id: self.id.with_description(description),
        }
    }

    /// Registers the timer, or returns the already registered timer with the same identity.
    pub fn register(self, registry: &MeterRegistry) -> LongTaskTimer {
        let clock = registry.config().clock();

        match registry.get_or_create(self.id, |id| {
            Meter::LongTaskTimer(LongTaskTimer::new(id, Arc::clone(&clock)))
        }) {
            Meter::LongTaskTimer(timer) => timer,
            other => LongTaskTimer::noop(Arc::clone(other.shared_id()), clock),
        }
    }
}
