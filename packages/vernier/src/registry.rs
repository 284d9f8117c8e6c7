use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::constants::ERR_POISONED_LOCK;
use crate::filter::{FilterReply, MeterFilter};
use crate::naming::Identity;
use crate::{
    Clock, Counter, CustomMeter, DistributionSummary, FunctionCounter, FunctionTimer, Gauge, Id,
    LongTaskTimer, Measurement, Meter, MeterText, NamingConvention, Search, SystemClock, Tags,
    TimeUnit, Timer,
};

/// Creates, deduplicates and looks up meters.
///
/// Registering a meter with an identity that is already registered returns the existing
/// meter, so application code can call the registration methods on every use without
/// creating duplicates. When several threads register the same identity concurrently,
/// exactly one meter is created and all of them receive it.
///
/// Neither looking up nor registering a meter takes a registry-wide lock. Every call runs
/// the identity through the filters of the registry, so filters that drop or rewrite tags
/// bound the number of meters without the registry remembering every requested identity.
///
/// The registry is cheap to clone; clones share the same meters.
///
/// # Example
///
/// ```
/// use vernier::{MeterRegistry, Tags};
///
/// let registry = MeterRegistry::new();
///
/// let first = registry.counter("jobs.completed", Tags::of([("queue", "email")]));
/// let second = registry.counter("jobs.completed", Tags::of([("queue", "email")]));
///
/// first.increment();
/// second.increment();
///
/// assert_eq!(first.count(), 2.0);
/// assert_eq!(registry.meters().len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct MeterRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    clock: Arc<dyn Clock>,

    // Keyed by the identity after filters have been applied.
    meters: scc::HashMap<Id, Meter>,
    filters: ArcSwap<Vec<Arc<dyn MeterFilter>>>,

    // Double `Arc` because `ArcSwap` can only hold sized types.
    convention: ArcSwap<Arc<dyn NamingConvention>>,
    convention_customized: AtomicBool,

    // Serializes changes to filters and naming convention. Meter registration never takes it.
    config_lock: Mutex<()>,
}

impl MeterRegistry {
    /// Creates an empty registry that measures time with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty registry that measures time with the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let convention: Arc<dyn NamingConvention> = Arc::new(Identity);

        Self {
            inner: Arc::new(RegistryInner {
                clock,
                meters: scc::HashMap::new(),
                filters: ArcSwap::from_pointee(Vec::new()),
                convention: ArcSwap::from_pointee(convention),
                convention_customized: AtomicBool::new(false),
                config_lock: Mutex::new(()),
            }),
        }
    }

    /// Returns the meter registered under `id`, or registers the meter created by `create`.
    ///
    /// The identity first passes through the filters of the registry, which may transform
    /// it. If no meter is registered under the transformed identity, the filters may also
    /// deny the registration. A denied registration returns a no-op meter of the requested
    /// kind that discards all writes and is never published.
    ///
    /// `create` receives the final identity. It must return a meter of the requested kind.
    pub fn get_or_create(&self, id: Id, create: impl FnOnce(Arc<Id>) -> Meter) -> Meter {
        let mapped = self.apply_filters(id);

        if let Some(meter) = self.get(&mapped) {
            return meter;
        }

        if self.is_denied(&mapped) {
            debug!(meter = %mapped, "meter registration denied by filter");
            return Meter::noop(Arc::new(mapped), Arc::clone(&self.inner.clock));
        }

        // A racing caller with the same identity may have won since the lookup above.
        let entry = self
            .inner
            .meters
            .entry(mapped.clone())
            .or_insert_with(|| create(Arc::new(mapped)));

        entry.get().clone()
    }

    fn apply_filters(&self, id: Id) -> Id {
        let filters = self.inner.filters.load();

        if filters.is_empty() {
            return id;
        }

        let kind = id.kind();

        filters
            .iter()
            .fold(id, |mapped, filter| filter.map(mapped))
            .with_kind(kind)
    }

    fn is_denied(&self, mapped: &Id) -> bool {
        let filters = self.inner.filters.load();

        filters
            .iter()
            .map(|filter| filter.accept(mapped))
            .find(|reply| *reply != FilterReply::Neutral)
            == Some(FilterReply::Deny)
    }

    /// Removes the meter registered under `id` (the identity after filters), returning it.
    ///
    /// Handles to the removed meter keep working but their writes are no longer published.
    /// Registering the same identity again creates a new meter.
    pub fn remove(&self, id: &Id) -> Option<Meter> {
        let (id, removed) = self.inner.meters.remove(id)?;

        self.notify_removed(&id);

        Some(removed)
    }

    /// Removes all meters.
    pub fn clear(&self) {
        let mut removed = Vec::new();

        self.inner.meters.retain(|id, _| {
            removed.push(id.clone());
            false
        });

        for id in &removed {
            self.notify_removed(id);
        }
    }

    fn notify_removed(&self, id: &Id) {
        for filter in self.inner.filters.load().iter() {
            filter.meter_removed(id);
        }
    }

    /// The meter registered under `id` (the identity after filters), if any.
    #[must_use]
    pub fn get(&self, id: &Id) -> Option<Meter> {
        self.inner.meters.read(id, |_, meter| meter.clone())
    }

    /// A snapshot of all registered meters, in no particular order.
    #[must_use]
    pub fn meters(&self) -> Vec<Meter> {
        let mut meters = Vec::with_capacity(self.inner.meters.len());

        self.inner.meters.scan(|_, meter| meters.push(meter.clone()));

        meters
    }

    /// Starts a search for registered meters with the given name.
    #[must_use]
    pub fn find(&self, name: impl Into<MeterText>) -> Search<'_> {
        Search::new(self, name.into())
    }

    /// Settings of the registry: filters, naming convention and clock.
    #[must_use]
    pub fn config(&self) -> RegistryConfig<'_> {
        RegistryConfig { registry: self }
    }

    /// Registers a counter or returns the existing one.
    pub fn counter(&self, name: impl Into<MeterText>, tags: Tags) -> Counter {
        Counter::builder(name).tags(tags).register(self)
    }

    /// Registers a gauge reporting the result of `value_fn` or returns the existing one.
    pub fn gauge<F>(&self, name: impl Into<MeterText>, tags: Tags, value_fn: F) -> Gauge
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Gauge::builder(name, value_fn).tags(tags).register(self)
    }

    /// Registers a timer or returns the existing one.
    pub fn timer(&self, name: impl Into<MeterText>, tags: Tags) -> Timer {
        Timer::builder(name).tags(tags).register(self)
    }

    /// Registers a distribution summary or returns the existing one.
    pub fn summary(&self, name: impl Into<MeterText>, tags: Tags) -> DistributionSummary {
        DistributionSummary::builder(name).tags(tags).register(self)
    }

    /// Registers a long task timer or returns the existing one.
    pub fn long_task_timer(&self, name: impl Into<MeterText>, tags: Tags) -> LongTaskTimer {
        LongTaskTimer::builder(name).tags(tags).register(self)
    }

    /// Registers a function counter or returns the existing one.
    pub fn function_counter<T, F>(
        &self,
        name: impl Into<MeterText>,
        tags: Tags,
        object: &Arc<T>,
        total_fn: F,
    ) -> FunctionCounter
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        FunctionCounter::builder(name, object, total_fn)
            .tags(tags)
            .register(self)
    }

    /// Registers a function timer or returns the existing one.
    pub fn function_timer<T, C, F>(
        &self,
        name: impl Into<MeterText>,
        tags: Tags,
        object: &Arc<T>,
        count_fn: C,
        total_time_fn: F,
        total_time_unit: TimeUnit,
    ) -> FunctionTimer
    where
        T: Send + Sync + 'static,
        C: Fn(&T) -> f64 + Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        FunctionTimer::builder(name, object, count_fn, total_time_fn, total_time_unit)
            .tags(tags)
            .register(self)
    }

    /// Registers a custom meter or returns the existing one.
    pub fn custom<F>(&self, name: impl Into<MeterText>, tags: Tags, measure_fn: F) -> CustomMeter
    where
        F: Fn() -> Vec<Measurement> + Send + Sync + 'static,
    {
        CustomMeter::builder(name, measure_fn)
            .tags(tags)
            .register(self)
    }
}

impl Default for MeterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings of a [`MeterRegistry`]. Obtained via [`MeterRegistry::config()`].
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig<'a> {
    registry: &'a MeterRegistry,
}

impl RegistryConfig<'_> {
    /// Appends a filter. Meters registered before keep their identity; later registration
    /// calls are mapped by the new filter too.
    #[must_use = "returns the config for chaining"]
    pub fn add_filter(self, filter: impl MeterFilter) -> Self {
        let inner = &self.registry.inner;
        let _guard = inner.config_lock.lock().expect(ERR_POISONED_LOCK);

        let mut filters = Vec::clone(&inner.filters.load());
        filters.push(Arc::new(filter));
        inner.filters.store(Arc::new(filters));

        self
    }

    /// Adds tags to every meter registered from now on. Tags of the meter itself win.
    #[must_use = "returns the config for chaining"]
    pub fn common_tags(self, tags: Tags) -> Self {
        self.add_filter(crate::filter::common_tags(tags))
    }

    /// Replaces the naming convention exporters use to render meters of this registry,
    /// overriding the conventions their backends prefer.
    ///
    /// Exporters notice the change on their next publish.
    #[must_use = "returns the config for chaining"]
    pub fn set_naming_convention(self, convention: Arc<dyn NamingConvention>) -> Self {
        let inner = &self.registry.inner;
        let _guard = inner.config_lock.lock().expect(ERR_POISONED_LOCK);

        inner.convention.store(Arc::new(convention));
        inner.convention_customized.store(true, Ordering::Release);

        self
    }

    /// The naming convention of the registry. This is [`Identity`] unless one was set with
    /// [`set_naming_convention()`][Self::set_naming_convention].
    #[must_use]
    pub fn naming_convention(self) -> Arc<dyn NamingConvention> {
        let current: &Arc<dyn NamingConvention> = &self.registry.inner.convention.load();
        Arc::clone(current)
    }

    /// The naming convention set with [`set_naming_convention()`][Self::set_naming_convention],
    /// if any.
    ///
    /// Exporters render with this convention when present and with the convention their
    /// backend prefers otherwise.
    #[must_use]
    pub fn explicit_naming_convention(self) -> Option<Arc<dyn NamingConvention>> {
        let inner = &self.registry.inner;

        inner
            .convention_customized
            .load(Ordering::Acquire)
            .then(|| self.naming_convention())
    }

    /// The clock used by timers of this registry and by publishers exporting it.
    #[must_use]
    pub fn clock(self) -> Arc<dyn Clock> {
        Arc::clone(&self.registry.inner.clock)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::filter::{deny_name_starts_with, max_allowed_meters, rename_tag};
    use crate::naming::SnakeCase;
    use crate::{MeterKind, Tag};

    assert_impl_all!(MeterRegistry: Send, Sync, Clone);

    #[test]
    fn equal_identities_share_one_meter() {
        let registry = MeterRegistry::new();

        let a = registry.counter("requests", Tags::of([("a", "1"), ("b", "2")]));
        let b = registry.counter("requests", Tags::of([("b", "2"), ("a", "1")]));

        a.increment();
        b.increment();

        assert_eq!(registry.meters().len(), 1);
        assert!((a.count() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn different_kinds_are_different_meters() {
        let registry = MeterRegistry::new();

        _ = registry.counter("x", Tags::empty());
        _ = registry.timer("x", Tags::empty());

        assert_eq!(registry.meters().len(), 2);
    }

    #[test]
    fn concurrent_registration_creates_single_instance() {
        let registry = MeterRegistry::new();
        let barrier = Barrier::new(8);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    registry.counter("contended", Tags::empty()).increment();
                });
            }
        });

        let meters = registry.meters();
        assert_eq!(meters.len(), 1);

        let Meter::Counter(counter) = &meters[0] else {
            panic!("expected a counter");
        };
        assert!((counter.count() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn denied_meters_are_noop_and_not_registered() {
        let registry = MeterRegistry::new();
        _ = registry.config().add_filter(deny_name_starts_with("jvm"));

        let denied = registry.counter("jvm.gc", Tags::empty());
        denied.increment();

        assert!(denied.is_noop());
        assert!(registry.meters().is_empty());
    }

    #[test]
    fn filters_map_identity_and_kind_is_preserved() {
        let registry = MeterRegistry::new();
        _ = registry
            .config()
            .common_tags(Tags::of([("app", "shop")]))
            .add_filter(rename_tag("http", "uri", "path"));

        let timer = registry.timer("http.requests", Tags::of([("uri", "/")]));

        assert_eq!(timer.id().tags().get("app"), Some("shop"));
        assert_eq!(timer.id().tags().get("path"), Some("/"));
        assert_eq!(timer.id().kind(), MeterKind::Timer);

        // Requested identity maps to the same meter on the next call.
        let again = registry.timer("http.requests", Tags::of([("uri", "/")]));
        assert_eq!(again.id(), timer.id());
        assert_eq!(registry.meters().len(), 1);
    }

    #[test]
    fn different_requests_mapping_to_same_identity_share_meter() {
        let registry = MeterRegistry::new();
        _ = registry
            .config()
            .add_filter(crate::filter::ignore_tags(["instance"]));

        let a = registry.counter("hits", Tags::of([("instance", "1")]));
        let b = registry.counter("hits", Tags::of([("instance", "2")]));

        a.increment();
        b.increment();

        assert_eq!(registry.meters().len(), 1);
        assert!((a.count() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn remove_stops_tracking_but_handle_still_works() {
        let registry = MeterRegistry::new();
        let counter = registry.counter("removable", Tags::empty());

        let removed = registry.remove(counter.id());
        assert!(removed.is_some());
        assert!(registry.get(counter.id()).is_none());
        assert!(registry.remove(counter.id()).is_none());

        counter.increment();
        assert!((counter.count() - 1.0).abs() < f64::EPSILON);

        let fresh = registry.counter("removable", Tags::empty());
        assert!(fresh.count().abs() < f64::EPSILON);
        assert_eq!(registry.meters().len(), 1);
    }

    #[test]
    fn max_allowed_meters_keeps_existing_meters_usable() {
        let registry = MeterRegistry::new();
        _ = registry.config().add_filter(max_allowed_meters(1));

        let first = registry.counter("user", Tags::of([("id", "1")]));
        let second = registry.counter("user", Tags::of([("id", "2")]));
        let first_again = registry.counter("user", Tags::of([("id", "1")]));

        assert!(!first.is_noop());
        assert!(second.is_noop());
        assert!(!first_again.is_noop());
    }

    #[test]
    fn explicit_convention_is_reported_only_when_set() {
        let registry = MeterRegistry::new();
        assert!(registry.config().explicit_naming_convention().is_none());

        let snake: Arc<dyn NamingConvention> = Arc::new(SnakeCase);
        _ = registry.config().set_naming_convention(Arc::clone(&snake));

        let explicit = registry.config().explicit_naming_convention().unwrap();
        assert!(Arc::ptr_eq(&explicit, &snake));
        assert!(Arc::ptr_eq(&registry.config().naming_convention(), &snake));
    }

    #[test]
    fn removing_a_meter_frees_its_slot_under_max_allowed_meters() {
        let registry = MeterRegistry::new();
        _ = registry.config().add_filter(max_allowed_meters(1));

        let first = registry.counter("user", Tags::of([("id", "1")]));
        assert!(registry.counter("user", Tags::of([("id", "2")])).is_noop());

        _ = registry.remove(first.id());

        let second = registry.counter("user", Tags::of([("id", "2")]));
        assert!(!second.is_noop());
        assert_eq!(registry.meters().len(), 1);
    }

    #[test]
    fn clearing_frees_all_slots_under_max_allowed_meters() {
        let registry = MeterRegistry::new();
        _ = registry.config().add_filter(max_allowed_meters(1));

        _ = registry.counter("a", Tags::empty());
        registry.clear();

        assert!(!registry.counter("b", Tags::empty()).is_noop());
    }

    #[test]
    fn collapsed_requests_leave_one_entry() {
        let registry = MeterRegistry::new();
        _ = registry
            .config()
            .add_filter(crate::filter::ignore_tags(["user"]));

        for user in 0..5_000 {
            registry
                .counter("user.hits", Tags::of([("user", user.to_string())]))
                .increment();
        }

        assert_eq!(registry.inner.meters.len(), 1);

        let counter = registry.counter("user.hits", Tags::empty());
        assert!((counter.count() - 5_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn many_distinct_meters_register_independently() {
        let registry = MeterRegistry::new();

        for user in 0..20_000 {
            registry
                .counter("user.hits", Tags::of([("user", user.to_string())]))
                .increment();
        }

        assert_eq!(registry.meters().len(), 20_000);

        let one = registry.counter("user.hits", Tags::of([("user", "19999")]));
        assert!((one.count() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn filters_added_later_rewrite_later_lookups() {
        let registry = MeterRegistry::new();
        let plain = registry.counter("jobs", Tags::empty());

        _ = registry.config().common_tags(Tags::of([("app", "shop")]));
        let tagged = registry.counter("jobs", Tags::empty());

        assert_ne!(plain.id(), tagged.id());
        assert_eq!(tagged.id().tags().get("app"), Some("shop"));
        assert_eq!(registry.meters().len(), 2);
    }

    #[test]
    fn clear_removes_everything() {
        let registry = MeterRegistry::new();
        _ = registry.counter("a", Tags::empty());
        _ = registry.gauge("b", Tags::empty(), || 1.0);

        registry.clear();

        assert!(registry.meters().is_empty());
        assert!(registry.get(&Id::new("a", MeterKind::Counter)).is_none());
    }

    #[test]
    fn builder_tags_and_registry_tags_combine() {
        let registry = MeterRegistry::new();

        let counter = Counter::builder("orders")
            .tags([Tag::new("region", "eu")])
            .tag("channel", "web")
            .register(&registry);

        assert_eq!(counter.id().tags().len(), 2);
    }
}
