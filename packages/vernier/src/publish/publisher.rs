use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    Backend, Clock, MeterRegistry, NamingConvention, Payload, Result, Sender, StepConfig,
    partition,
};

/// Periodically exports the meters of a registry to a backend.
///
/// On every step the publisher takes a snapshot of every registered meter (resetting
/// step-scoped statistics), splits the meters into batches of at most
/// [`StepConfig::batch_size`], lets the backend render and encode each batch and hands the
/// resulting payloads to the [`Sender`].
///
/// Sends are not awaited by the publisher. A failed send is logged and counted in
/// [`PublisherStats`] and affects neither the other batches of the same step nor later
/// steps.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use vernier::{MeterRegistry, StepConfig, StepPublisher};
/// # use vernier::{Backend, Sender};
/// # async fn example(backend: impl Backend, sender: Arc<dyn Sender>) -> vernier::Result<()> {
///
/// let registry = MeterRegistry::new();
///
/// let handle = StepPublisher::new(registry.clone(), backend, sender, StepConfig::default())?
///     .start();
///
/// // ... the application records measurements ...
///
/// // Publishes whatever was recorded since the last step, then stops.
/// handle.close().await;
/// # Ok(())
/// # }
/// ```
pub struct StepPublisher<B: Backend> {
    registry: MeterRegistry,
    backend: B,
    sender: Arc<dyn Sender>,
    config: StepConfig,
    clock: Arc<dyn Clock>,

    // Created once so that naming caches keyed by convention identity stay warm.
    preferred_convention: Option<Arc<dyn NamingConvention>>,

    stats: Arc<PublisherStats>,
    state: Arc<AtomicU8>,
}

impl<B: Backend> StepPublisher<B> {
    /// Creates a publisher for the meters of `registry`.
    ///
    /// Meters are rendered with the naming convention set explicitly on the registry, or
    /// with the convention the backend prefers if none was set. Publishers sharing a
    /// registry do not affect each other's naming.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        registry: MeterRegistry,
        backend: B,
        sender: Arc<dyn Sender>,
        config: StepConfig,
    ) -> Result<Self> {
        config.validate()?;

        let preferred_convention = backend.naming_convention();
        let clock = registry.config().clock();

        Ok(Self {
            registry,
            backend,
            sender,
            config,
            clock,
            preferred_convention,
            stats: Arc::new(PublisherStats::default()),
            state: Arc::new(AtomicU8::new(PublisherState::Idle as u8)),
        })
    }

    /// Uses the given clock to align publishing to step boundaries. Defaults to the clock
    /// of the registry.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backend this publisher exports to.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Counters of payloads sent and failed so far.
    #[must_use]
    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Publishes once, right now.
    ///
    /// Payloads are sent on the current Tokio runtime without waiting for the sends to
    /// complete. Without a runtime, payloads are counted as failed.
    ///
    /// This is what the publishing loop calls on every step. It is exposed for tests and
    /// for applications that want to control publishing themselves.
    pub fn run_one_iteration(&self) -> PublishSummary {
        self.transition(PublisherState::Publishing);

        let convention = self.naming_convention();
        let unit = self.backend.base_time_unit();
        let runtime = Handle::try_current().ok();

        let meters = self.registry.meters();
        self.backend.retain(&meters);

        let mut summary = PublishSummary::default();

        for batch in partition(&meters, self.config.batch_size) {
            summary.batches = summary.batches.saturating_add(1);

            let mut records = Vec::new();

            for meter in batch {
                let snapshot = meter.take_snapshot(unit);

                if !snapshot.has_finite_values() {
                    summary.skipped_meters = summary.skipped_meters.saturating_add(1);
                    continue;
                }

                records.extend(self.backend.write(meter, &snapshot, &convention));
            }

            if records.is_empty() {
                continue;
            }

            summary.records = summary.records.saturating_add(records.len());

            match self.backend.encode(records) {
                Ok(payloads) => {
                    for payload in payloads {
                        summary.payloads = summary.payloads.saturating_add(1);
                        self.dispatch(payload, runtime.as_ref());
                    }
                }
                Err(error) => {
                    warn!(
                        backend = self.backend.name(),
                        %error,
                        "failed to encode batch, its meters are not published this step"
                    );
                }
            }
        }

        debug!(
            backend = self.backend.name(),
            meters = meters.len(),
            batches = summary.batches,
            payloads = summary.payloads,
            "published step"
        );

        self.transition_from(PublisherState::Publishing, PublisherState::Idle);

        summary
    }

    fn naming_convention(&self) -> Arc<dyn NamingConvention> {
        let registry = self.registry.config();

        registry
            .explicit_naming_convention()
            .or_else(|| self.preferred_convention.clone())
            .unwrap_or_else(|| registry.naming_convention())
    }

    fn dispatch(&self, payload: Payload, runtime: Option<&Handle>) {
        let backend = self.backend.name();

        let Some(runtime) = runtime else {
            self.stats.record_failure();
            warn!(backend, "no Tokio runtime available, payload dropped");
            return;
        };

        let records = payload.records();
        let send = self.sender.send(payload);
        let stats = Arc::clone(&self.stats);

        runtime.spawn(async move {
            match send.await {
                Ok(response) if response.is_success() => {
                    stats.record_success();
                    debug!(backend, records, "payload sent");
                }
                Ok(response) => {
                    stats.record_failure();
                    error!(
                        backend,
                        code = response.code(),
                        body = response.body(),
                        "backend rejected payload"
                    );
                }
                Err(error) => {
                    stats.record_failure();
                    warn!(backend, %error, "failed to send payload");
                }
            }
        });
    }

    /// Starts publishing once per step on the current Tokio runtime.
    ///
    /// The first publish happens just after the next step boundary of the wall clock, so
    /// publishers in different processes with the same step publish at about the same
    /// time. Publishes never overlap.
    ///
    /// If the configuration disables publishing, nothing is started and the returned handle
    /// is already stopped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(self) -> PublisherHandle {
        let (lifecycle, lifecycle_rx) = watch::channel(Lifecycle::Running);
        let stats = Arc::clone(&self.stats);
        let state = Arc::clone(&self.state);

        if !self.config.enabled {
            info!(backend = self.backend.name(), "publishing is disabled");
            self.transition(PublisherState::Stopped);

            return PublisherHandle {
                lifecycle,
                task: None,
                stats,
                state,
            };
        }

        info!(
            backend = self.backend.name(),
            step = ?self.config.step,
            "starting publisher"
        );

        let task = tokio::spawn(self.publish_until_stopped(lifecycle_rx));

        PublisherHandle {
            lifecycle,
            task: Some(task),
            stats,
            state,
        }
    }

    async fn publish_until_stopped(self, mut lifecycle: watch::Receiver<Lifecycle>) {
        let first_tick = Instant::now()
            .checked_add(self.delay_to_next_step())
            .unwrap_or_else(Instant::now);

        let mut ticks = time::interval_at(first_tick, self.config.step);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.transition_from(PublisherState::Idle, PublisherState::Scheduled);

            tokio::select! {
                _ = ticks.tick() => {
                    _ = self.run_one_iteration();
                }
                changed = lifecycle.changed() => {
                    // A dropped handle counts as a stop request.
                    let next = if changed.is_ok() {
                        *lifecycle.borrow_and_update()
                    } else {
                        Lifecycle::Stopped
                    };

                    match next {
                        Lifecycle::Running => {}
                        Lifecycle::Stopped => break,
                        Lifecycle::Closing => {
                            _ = self.run_one_iteration();
                            break;
                        }
                    }
                }
            }
        }

        self.transition(PublisherState::Stopped);
        info!(backend = self.backend.name(), "publisher stopped");
    }

    /// Time until just after the next multiple of the step on the wall clock.
    fn delay_to_next_step(&self) -> Duration {
        let step_nanos = self.config.step.as_nanos();
        let wall_nanos = self.clock.wall_time().as_nanos();

        let into_step = wall_nanos.checked_rem(step_nanos).unwrap_or(0);
        let remaining = step_nanos.saturating_sub(into_step);

        Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
            .saturating_add(STEP_BOUNDARY_OFFSET)
    }

    fn transition(&self, to: PublisherState) {
        if self.state.load(Ordering::Acquire) != PublisherState::Stopped as u8 {
            self.state.store(to as u8, Ordering::Release);
        }
    }

    fn transition_from(&self, from: PublisherState, to: PublisherState) {
        _ = self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

// Publishing slightly after the boundary makes sure all meters have rolled over into the
// new step by the time they are read.
const STEP_BOUNDARY_OFFSET: Duration = Duration::from_millis(1);

impl<B: Backend> Debug for StepPublisher<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepPublisher")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// What one publish did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct PublishSummary {
    /// Number of batches the registered meters were split into.
    pub batches: usize,

    /// Number of records the backend produced.
    pub records: usize,

    /// Number of payloads handed to the sender.
    pub payloads: usize,

    /// Number of meters skipped because they had no finite values.
    pub skipped_meters: usize,
}

/// Counters of send outcomes, shared between a publisher and its handle.
#[derive(Debug, Default)]
pub struct PublisherStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl PublisherStats {
    /// Payloads the backend accepted.
    #[must_use]
    pub fn sent_payloads(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Payloads that failed to send or were rejected by the backend.
    #[must_use]
    pub fn failed_payloads(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record_success(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Where a publisher is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
#[non_exhaustive]
pub enum PublisherState {
    /// Not publishing and not waiting for a step.
    Idle,
    /// Waiting for the next step.
    Scheduled,
    /// Publishing a step.
    Publishing,
    /// Stopped for good.
    Stopped,
}

impl PublisherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Scheduled,
            2 => Self::Publishing,
            _ => Self::Stopped,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Lifecycle {
    Running,
    Stopped,
    Closing,
}

/// Controls a publisher started with [`StepPublisher::start`].
///
/// Dropping the handle stops the publisher, like [`stop()`][PublisherHandle::stop].
#[derive(Debug)]
pub struct PublisherHandle {
    lifecycle: watch::Sender<Lifecycle>,
    task: Option<JoinHandle<()>>,
    stats: Arc<PublisherStats>,
    state: Arc<AtomicU8>,
}

impl PublisherHandle {
    /// Stops publishing. Sends already in flight are not interrupted.
    pub fn stop(&self) {
        self.lifecycle.send_replace(Lifecycle::Stopped);
    }

    /// Stops publishing after one final publish of whatever was recorded since the last
    /// step, waiting for the publishing loop to finish.
    pub async fn close(mut self) {
        self.lifecycle.send_replace(Lifecycle::Closing);

        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(%error, "publisher task did not finish cleanly");
            }
        }
    }

    /// Counters of payloads sent and failed so far.
    #[must_use]
    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Where the publisher is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> PublisherState {
        PublisherState::from_u8(self.state.load(Ordering::Acquire))
    }
}
