use crate::{
    Counter, DistributionSummary, FunctionCounter, FunctionTimer, Gauge, LongTaskTimer, Meter,
    MeterRegistry, MeterText, Tag, Timer,
};

/// Finds registered meters by name and tags. Created by [`MeterRegistry::find()`].
///
/// Matching is done against identities after filters have been applied.
///
/// # Example
///
/// ```
/// use vernier::{MeterRegistry, Tags};
///
/// let registry = MeterRegistry::new();
/// registry.counter("cache.hits", Tags::of([("cache", "users")])).increment();
/// registry.counter("cache.hits", Tags::of([("cache", "orders")]));
///
/// let users = registry
///     .find("cache.hits")
///     .tag("cache", "users")
///     .counter()
///     .unwrap();
///
/// assert_eq!(users.count(), 1.0);
/// assert_eq!(registry.find("cache.hits").tag_key("cache").meters().len(), 2);
/// ```
#[derive(Debug)]
#[must_use]
pub struct Search<'a> {
    registry: &'a MeterRegistry,
    name: MeterText,
    tags: Vec<Tag>,
    tag_keys: Vec<MeterText>,
}

impl<'a> Search<'a> {
    pub(crate) fn new(registry: &'a MeterRegistry, name: MeterText) -> Self {
        Self {
            registry,
            name,
            tags: Vec::new(),
            tag_keys: Vec::new(),
        }
    }

    /// Only matches meters that have a tag with this key and value.
    pub fn tag(mut self, key: impl Into<MeterText>, value: impl Into<MeterText>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Only matches meters that have a tag with this key, whatever its value.
    pub fn tag_key(mut self, key: impl Into<MeterText>) -> Self {
        self.tag_keys.push(key.into());
        self
    }

    /// Only matches meters that have tags with all of these keys.
    pub fn tag_keys<K: Into<MeterText>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.tag_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// All matching meters, in no particular order.
    #[must_use]
    pub fn meters(&self) -> Vec<Meter> {
        self.registry
            .meters()
            .into_iter()
            .filter(|meter| self.matches(meter))
            .collect()
    }

    /// Any one matching meter.
    #[must_use]
    pub fn meter(&self) -> Option<Meter> {
        self.registry
            .meters()
            .into_iter()
            .find(|meter| self.matches(meter))
    }

    /// Any one matching counter.
    #[must_use]
    pub fn counter(&self) -> Option<Counter> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::Counter(counter) => Some(counter),
            _ => None,
        })
    }

    /// Any one matching gauge.
    #[must_use]
    pub fn gauge(&self) -> Option<Gauge> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::Gauge(gauge) => Some(gauge),
            _ => None,
        })
    }

    /// Any one matching timer.
    #[must_use]
    pub fn timer(&self) -> Option<Timer> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::Timer(timer) => Some(timer),
            _ => None,
        })
    }

    /// Any one matching distribution summary.
    #[must_use]
    pub fn summary(&self) -> Option<DistributionSummary> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::DistributionSummary(summary) => Some(summary),
            _ => None,
        })
    }

    /// Any one matching long task timer.
    #[must_use]
    pub fn long_task_timer(&self) -> Option<LongTaskTimer> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::LongTaskTimer(timer) => Some(timer),
            _ => None,
        })
    }

    /// Any one matching function counter.
    #[must_use]
    pub fn function_counter(&self) -> Option<FunctionCounter> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::FunctionCounter(counter) => Some(counter),
            _ => None,
        })
    }

    /// Any one matching function timer.
    #[must_use]
    pub fn function_timer(&self) -> Option<FunctionTimer> {
        self.meters().into_iter().find_map(|meter| match meter {
            Meter::FunctionTimer(timer) => Some(timer),
            _ => None,
        })
    }

    fn matches(&self, meter: &Meter) -> bool {
        let id = meter.id();

        id.name() == self.name
            && self
                .tags
                .iter()
                .all(|tag| id.tags().get(tag.key()) == Some(tag.value()))
            && self
                .tag_keys
                .iter()
                .all(|key| id.tags().get(key).is_some())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::Tags;

    #[test]
    fn matches_name_tags_and_kind() {
        let registry = MeterRegistry::new();
        _ = registry.counter("db.calls", Tags::of([("table", "users"), ("op", "read")]));
        _ = registry.timer("db.calls", Tags::of([("table", "users")]));
        _ = registry.counter("db.errors", Tags::empty());

        assert_eq!(registry.find("db.calls").meters().len(), 2);
        assert_eq!(registry.find("db.calls").tag_key("op").meters().len(), 1);
        assert!(registry.find("db.calls").timer().is_some());
        assert!(registry.find("db.calls").tag("op", "write").meter().is_none());
        assert!(registry.find("db.calls").gauge().is_none());
        assert!(registry.find("missing").meter().is_none());
        assert_eq!(
            registry
                .find("db.calls")
                .tag_keys(["table", "op"])
                .meters()
                .len(),
            1
        );
    }
}
