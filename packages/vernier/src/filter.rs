//! Filters that transform or veto meter registrations.

use std::fmt::{self, Debug};
use std::sync::Mutex;

use foldhash::{HashSet, HashSetExt};

use crate::constants::ERR_POISONED_LOCK;
use crate::{Id, MeterText, Tag, Tags};

/// The verdict of a filter on a meter registration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "three-valued logic; there is nothing to add"
)]
pub enum FilterReply {
    /// Register the meter, ignoring the verdicts of all later filters.
    Accept,
    /// Do not register the meter. The caller receives a no-op meter.
    Deny,
    /// Leave the decision to later filters. If all filters are neutral, the meter is
    /// registered.
    Neutral,
}

/// Transforms or vetoes meter registrations.
///
/// Every registration call passes the requested identity through the
/// [`map()`][MeterFilter::map] of every filter, in the order the filters were added. If no
/// meter is registered under the mapped identity yet, it is offered to
/// [`accept()`][MeterFilter::accept] of every filter; the first reply that is not
/// [`FilterReply::Neutral`] decides.
///
/// Filters added later do not affect meters that are already registered, but later calls
/// are mapped by them.
pub trait MeterFilter: Debug + Send + Sync + 'static {
    /// Decides whether a meter with the given (already mapped) identity is registered.
    fn accept(&self, _id: &Id) -> FilterReply {
        FilterReply::Neutral
    }

    /// Transforms the identity of a meter before it is registered.
    fn map(&self, id: Id) -> Id {
        id
    }

    /// Called after the meter with the given identity was removed from the registry.
    fn meter_removed(&self, _id: &Id) {}
}

/// Adds tags to every meter. Tags the meter already has take precedence.
#[must_use]
pub fn common_tags(tags: Tags) -> impl MeterFilter {
    CommonTags { tags }
}

#[derive(Debug)]
struct CommonTags {
    tags: Tags,
}

impl MeterFilter for CommonTags {
    fn map(&self, id: Id) -> Id {
        let merged = self.tags.and(id.tags().iter().cloned());
        id.replace_tags(merged)
    }
}

/// Removes the tags with the given keys from every meter.
#[must_use]
pub fn ignore_tags<K: Into<MeterText>>(keys: impl IntoIterator<Item = K>) -> impl MeterFilter {
    IgnoreTags {
        keys: keys.into_iter().map(Into::into).collect(),
    }
}

#[derive(Debug)]
struct IgnoreTags {
    keys: Vec<MeterText>,
}

impl MeterFilter for IgnoreTags {
    fn map(&self, id: Id) -> Id {
        let kept = id
            .tags()
            .iter()
            .filter(|tag| !self.keys.iter().any(|key| key == tag.key()))
            .cloned()
            .collect();

        id.replace_tags(kept)
    }
}

/// Renames a tag key on meters whose name starts with `name_prefix`.
#[must_use]
pub fn rename_tag(
    name_prefix: impl Into<MeterText>,
    from_key: impl Into<MeterText>,
    to_key: impl Into<MeterText>,
) -> impl MeterFilter {
    RenameTag {
        name_prefix: name_prefix.into(),
        from_key: from_key.into(),
        to_key: to_key.into(),
    }
}

#[derive(Debug)]
struct RenameTag {
    name_prefix: MeterText,
    from_key: MeterText,
    to_key: MeterText,
}

impl MeterFilter for RenameTag {
    fn map(&self, id: Id) -> Id {
        if !id.name().starts_with(self.name_prefix.as_ref()) {
            return id;
        }

        let renamed = id
            .tags()
            .iter()
            .map(|tag| {
                if tag.key() == self.from_key {
                    Tag::new(self.to_key.clone(), tag.value().to_string())
                } else {
                    tag.clone()
                }
            })
            .collect();

        id.replace_tags(renamed)
    }
}

/// Rewrites the values of the tag with key `key`, leaving values listed in `exceptions`
/// untouched. Useful for bounding the number of distinct values of a tag.
#[must_use]
pub fn replace_tag_values<F, E>(
    key: impl Into<MeterText>,
    replacement: F,
    exceptions: impl IntoIterator<Item = E>,
) -> impl MeterFilter
where
    F: Fn(&str) -> String + Send + Sync + 'static,
    E: Into<MeterText>,
{
    ReplaceTagValues {
        key: key.into(),
        replacement: Box::new(replacement),
        exceptions: exceptions.into_iter().map(Into::into).collect(),
    }
}

struct ReplaceTagValues {
    key: MeterText,
    replacement: Box<dyn Fn(&str) -> String + Send + Sync>,
    exceptions: Vec<MeterText>,
}

impl MeterFilter for ReplaceTagValues {
    fn map(&self, id: Id) -> Id {
        let Some(value) = id.tags().get(&self.key) else {
            return id;
        };

        if self.exceptions.iter().any(|exception| exception == value) {
            return id;
        }

        let replaced = (self.replacement)(value);
        id.with_tag(self.key.clone(), replaced)
    }
}

impl Debug for ReplaceTagValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplaceTagValues")
            .field("key", &self.key)
            .field("exceptions", &self.exceptions)
            .finish_non_exhaustive()
    }
}

/// Denies meters whose name starts with `prefix`.
#[must_use]
pub fn deny_name_starts_with(prefix: impl Into<MeterText>) -> impl MeterFilter {
    NameStartsWith {
        prefix: prefix.into(),
        reply: FilterReply::Deny,
    }
}

/// Accepts meters whose name starts with `prefix`, overriding later filters.
#[must_use]
pub fn accept_name_starts_with(prefix: impl Into<MeterText>) -> impl MeterFilter {
    NameStartsWith {
        prefix: prefix.into(),
        reply: FilterReply::Accept,
    }
}

#[derive(Debug)]
struct NameStartsWith {
    prefix: MeterText,
    reply: FilterReply,
}

impl MeterFilter for NameStartsWith {
    fn accept(&self, id: &Id) -> FilterReply {
        if id.name().starts_with(self.prefix.as_ref()) {
            self.reply
        } else {
            FilterReply::Neutral
        }
    }
}

/// Denies every meter for which `predicate` returns false.
#[must_use]
pub fn deny_unless<P>(predicate: P) -> impl MeterFilter
where
    P: Fn(&Id) -> bool + Send + Sync + 'static,
{
    DenyUnless {
        predicate: Box::new(predicate),
    }
}

struct DenyUnless {
    predicate: Box<dyn Fn(&Id) -> bool + Send + Sync>,
}

impl MeterFilter for DenyUnless {
    fn accept(&self, id: &Id) -> FilterReply {
        if (self.predicate)(id) {
            FilterReply::Neutral
        } else {
            FilterReply::Deny
        }
    }
}

impl Debug for DenyUnless {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenyUnless").finish_non_exhaustive()
    }
}

/// Denies new meters once `max` distinct meters accepted by this filter are registered.
/// Removing a meter from the registry frees its slot.
///
/// Protects against unbounded tag cardinality, e.g. a tag whose value is a user ID.
#[must_use]
pub fn max_allowed_meters(max: usize) -> impl MeterFilter {
    MaxAllowedMeters {
        max,
        seen: Mutex::new(HashSet::new()),
    }
}

#[derive(Debug)]
struct MaxAllowedMeters {
    max: usize,
    seen: Mutex<HashSet<Id>>,
}

impl MeterFilter for MaxAllowedMeters {
    fn accept(&self, id: &Id) -> FilterReply {
        let mut seen = self.seen.lock().expect(ERR_POISONED_LOCK);

        if seen.contains(id) {
            return FilterReply::Neutral;
        }

        if seen.len() >= self.max {
            return FilterReply::Deny;
        }

        seen.insert(id.clone());
        FilterReply::Neutral
    }

    fn meter_removed(&self, id: &Id) {
        self.seen.lock().expect(ERR_POISONED_LOCK).remove(id);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::MeterKind;

    fn id() -> Id {
        Id::new("http.requests", MeterKind::Counter)
            .with_tag("uri", "/users/123")
            .with_tag("env", "dev")
    }

    #[test]
    fn common_tags_do_not_override_meter_tags() {
        let filter = common_tags(Tags::of([("env", "prod"), ("region", "eu")]));

        let mapped = filter.map(id());

        assert_eq!(mapped.tags().get("env"), Some("dev"));
        assert_eq!(mapped.tags().get("region"), Some("eu"));
        assert_eq!(filter.accept(&mapped), FilterReply::Neutral);
    }

    #[test]
    fn ignore_tags_removes_keys() {
        let mapped = ignore_tags(["uri"]).map(id());

        assert_eq!(mapped.tags().get("uri"), None);
        assert_eq!(mapped.tags().len(), 1);
    }

    #[test]
    fn rename_tag_only_applies_to_prefix() {
        let filter = rename_tag("http", "env", "environment");

        let renamed = filter.map(id());
        assert_eq!(renamed.tags().get("environment"), Some("dev"));
        assert_eq!(renamed.tags().get("env"), None);

        let other = filter.map(Id::new("db.calls", MeterKind::Timer).with_tag("env", "dev"));
        assert_eq!(other.tags().get("env"), Some("dev"));
    }

    #[test]
    fn replace_tag_values_respects_exceptions() {
        let filter = replace_tag_values("uri", |_| "/users/{id}".to_string(), ["/health"]);

        assert_eq!(filter.map(id()).tags().get("uri"), Some("/users/{id}"));

        let health = Id::new("http.requests", MeterKind::Counter).with_tag("uri", "/health");
        assert_eq!(filter.map(health).tags().get("uri"), Some("/health"));
    }

    #[test]
    fn name_prefix_filters() {
        let deny = deny_name_starts_with("http");
        let accept = accept_name_starts_with("http");
        let unrelated = Id::new("db.calls", MeterKind::Timer);

        assert_eq!(deny.accept(&id()), FilterReply::Deny);
        assert_eq!(accept.accept(&id()), FilterReply::Accept);
        assert_eq!(deny.accept(&unrelated), FilterReply::Neutral);
        assert_eq!(accept.accept(&unrelated), FilterReply::Neutral);
    }

    #[test]
    fn deny_unless_denies_when_predicate_fails() {
        let filter = deny_unless(|id| id.kind() == MeterKind::Timer);

        assert_eq!(filter.accept(&id()), FilterReply::Deny);
        assert_eq!(
            filter.accept(&Id::new("t", MeterKind::Timer)),
            FilterReply::Neutral
        );
    }

    #[test]
    fn max_allowed_meters_caps_distinct_ids() {
        let filter = max_allowed_meters(2);
        let a = Id::new("a", MeterKind::Counter);
        let b = Id::new("b", MeterKind::Counter);
        let c = Id::new("c", MeterKind::Counter);

        assert_eq!(filter.accept(&a), FilterReply::Neutral);
        assert_eq!(filter.accept(&b), FilterReply::Neutral);
        assert_eq!(filter.accept(&c), FilterReply::Deny);
        assert_eq!(filter.accept(&a), FilterReply::Neutral);
    }

    #[test]
    fn max_allowed_meters_forgets_removed_ids() {
        let filter = max_allowed_meters(1);
        let a = Id::new("a", MeterKind::Counter);
        let b = Id::new("b", MeterKind::Counter);

        assert_eq!(filter.accept(&a), FilterReply::Neutral);
        assert_eq!(filter.accept(&b), FilterReply::Deny);

        filter.meter_removed(&a);

        assert_eq!(filter.accept(&b), FilterReply::Neutral);
        assert_eq!(filter.accept(&a), FilterReply::Deny);
    }
}
