use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use crate::NamingConvention;

/// Text used in meter identities: names, tag keys, tag values, units and descriptions.
///
/// Typically these are `&'static str` but for cases when the set of meters is only known
/// at runtime (e.g. one meter per configured endpoint), owned strings are supported via `Cow`.
pub type MeterText = Cow<'static, str>;

/// The kind of a meter, which is part of its identity.
///
/// Two meters with the same name and tags but different kinds are different meters.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[expect(
    clippy::exhaustive_enums,
    reason = "exporters match on every kind; a new kind must be a compile error for them"
)]
pub enum MeterKind {
    /// Monotonically increasing count, reset every step.
    Counter,
    /// Instantaneous value read at publish time.
    Gauge,
    /// Count, total and maximum of recorded durations.
    Timer,
    /// Count, total and maximum of recorded amounts.
    DistributionSummary,
    /// Number and total duration of tasks that are currently in progress.
    LongTaskTimer,
    /// Counter whose cumulative value is read from an external object.
    FunctionCounter,
    /// Timer whose cumulative count and total are read from an external object.
    FunctionTimer,
    /// Anything else, described by arbitrary measurements.
    Other,
}

impl MeterKind {
    /// Lowercase name of the kind, suitable for use as a tag or attribute value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
            Self::DistributionSummary => "distribution_summary",
            Self::LongTaskTimer => "long_task_timer",
            Self::FunctionCounter => "function_counter",
            Self::FunctionTimer => "function_timer",
            Self::Other => "other",
        }
    }
}

impl Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single key-value dimension of a meter.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag {
    key: MeterText,
    value: MeterText,
}

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(key: impl Into<MeterText>, value: impl Into<MeterText>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The key of the tag.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value of the tag.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An immutable set of tags with unique keys, sorted by key.
///
/// Sorting makes the order in which tags were supplied irrelevant for equality and makes
/// rendering deterministic. If the same key is supplied more than once, the last value wins.
///
/// # Example
///
/// ```
/// use vernier::Tags;
///
/// let tags = Tags::of([("region", "eu"), ("host", "a"), ("region", "us")]);
///
/// let keys: Vec<_> = tags.iter().map(|t| t.key()).collect();
/// assert_eq!(keys, ["host", "region"]);
/// assert_eq!(tags.get("region"), Some("us"));
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Tags {
    // Sorted by key, keys unique.
    tags: Box<[Tag]>,
}

impl Tags {
    /// An empty tag set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a tag set from key-value pairs.
    #[must_use]
    pub fn of<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<MeterText>,
        V: Into<MeterText>,
    {
        pairs.into_iter().map(|(k, v)| Tag::new(k, v)).collect()
    }

    /// Returns a new tag set containing the tags of both sets.
    ///
    /// Where both sets have a tag with the same key, the value from `other` wins.
    #[must_use]
    pub fn and(&self, other: impl IntoIterator<Item = Tag>) -> Self {
        self.iter().cloned().chain(other).collect()
    }

    /// Iterates over the tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// Returns the value of the tag with the given key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|tag| tag.key().cmp(key))
            .ok()
            .and_then(|index| self.tags.get(index))
            .map(Tag::value)
    }

    /// Number of tags in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the set has no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let by_key = iter
            .into_iter()
            .map(|tag| (tag.key.clone(), tag))
            .collect::<BTreeMap<_, _>>();

        Self {
            tags: by_key.into_values().collect(),
        }
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_vec().into_iter()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// The identity of a meter.
///
/// Two identities are equal if their name, tags and kind are equal. The base unit and
/// description are carried along for exporters that can use them but do not participate
/// in equality.
///
/// Identities are immutable - the `with_*` methods return modified copies.
///
/// # Example
///
/// ```
/// use vernier::{Id, MeterKind};
///
/// let a = Id::new("http.requests", MeterKind::Counter)
///     .with_tag("method", "GET")
///     .with_tag("status", "200");
/// let b = Id::new("http.requests", MeterKind::Counter)
///     .with_tag("status", "200")
///     .with_tag("method", "GET")
///     .with_description("Requests served");
///
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug)]
pub struct Id {
    name: MeterText,
    tags: Tags,
    kind: MeterKind,
    base_unit: Option<MeterText>,
    description: Option<MeterText>,
}

impl Id {
    /// Creates an identity with no tags.
    #[must_use]
    pub fn new(name: impl Into<MeterText>, kind: MeterKind) -> Self {
        Self {
            name: name.into(),
            tags: Tags::empty(),
            kind,
            base_unit: None,
            description: None,
        }
    }

    /// The name of the meter, before any naming convention is applied.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tags of the meter, before any naming convention is applied.
    #[must_use]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// The kind of the meter.
    #[must_use]
    pub fn kind(&self) -> MeterKind {
        self.kind
    }

    /// The unit of the values recorded by the meter, if known.
    #[must_use]
    pub fn base_unit(&self) -> Option<&str> {
        self.base_unit.as_deref()
    }

    /// A human-readable description of the meter, if provided.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns a copy with a different name.
    #[must_use]
    pub fn with_name(&self, name: impl Into<MeterText>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Returns a copy with one more tag, replacing any existing tag with the same key.
    #[must_use]
    pub fn with_tag(&self, key: impl Into<MeterText>, value: impl Into<MeterText>) -> Self {
        self.with_tags([Tag::new(key, value)])
    }

    /// Returns a copy with additional tags, replacing any existing tags with the same keys.
    #[must_use]
    pub fn with_tags(&self, tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            tags: self.tags.and(tags),
            ..self.clone()
        }
    }

    /// Returns a copy with the tag set replaced entirely.
    #[must_use]
    pub fn replace_tags(&self, tags: Tags) -> Self {
        Self {
            tags,
            ..self.clone()
        }
    }

    /// Returns a copy with the given base unit.
    #[must_use]
    pub fn with_base_unit(&self, base_unit: impl Into<MeterText>) -> Self {
        Self {
            base_unit: Some(base_unit.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the given description.
    #[must_use]
    pub fn with_description(&self, description: impl Into<MeterText>) -> Self {
        Self {
            description: Some(description.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with a different kind. Only used when the registry coerces
    /// a filtered identity back to the kind that was requested.
    #[must_use]
    pub(crate) fn with_kind(&self, kind: MeterKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// The name of the meter as rendered by the given naming convention.
    #[must_use]
    pub fn convention_name(&self, convention: &dyn NamingConvention) -> String {
        convention.name(&self.name, self.kind, self.base_unit())
    }

    /// The tags of the meter as rendered by the given naming convention, in key order.
    #[must_use]
    pub fn convention_tags(&self, convention: &dyn NamingConvention) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|tag| (convention.tag_key(tag.key()), convention.tag_value(tag.value())))
            .collect()
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name && self.tags == other.tags
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.tags.hash(state);
        self.kind.hash(state);
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        if !self.tags.is_empty() {
            f.write_str("{")?;

            for (index, tag) in self.tags.iter().enumerate() {
                if index > 0 {
                    f.write_str(",")?;
                }

                write!(f, "{}={}", tag.key(), tag.value())?;
            }

            f.write_str("}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::naming;

    assert_impl_all!(Id: Send, Sync);
    assert_impl_all!(Tags: Send, Sync);

    #[test]
    fn tags_are_sorted_and_deduplicated() {
        let tags = Tags::of([("b", "1"), ("a", "2"), ("b", "3")]);

        let pairs = tags
            .iter()
            .map(|t| (t.key(), t.value()))
            .collect::<Vec<_>>();

        assert_eq!(pairs, [("a", "2"), ("b", "3")]);
    }

    #[test]
    fn tag_order_does_not_affect_equality_or_hash() {
        let a = Id::new("x", MeterKind::Timer).with_tags(Tags::of([("k1", "v1"), ("k2", "v2")]));
        let b = Id::new("x", MeterKind::Timer).with_tags(Tags::of([("k2", "v2"), ("k1", "v1")]));

        assert_eq!(a, b);

        let set = [a, b].into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn kind_participates_in_equality() {
        let counter = Id::new("x", MeterKind::Counter);
        let gauge = Id::new("x", MeterKind::Gauge);

        assert_ne!(counter, gauge);
    }

    #[test]
    fn unit_and_description_do_not_participate_in_equality() {
        let plain = Id::new("x", MeterKind::Gauge);
        let decorated = plain.with_base_unit("bytes").with_description("buffer size");

        assert_eq!(plain, decorated);
        assert_eq!(decorated.base_unit(), Some("bytes"));
        assert_eq!(decorated.description(), Some("buffer size"));
    }

    #[test]
    fn and_prefers_values_from_other() {
        let tags = Tags::of([("env", "dev"), ("host", "a")]).and([Tag::new("env", "prod")]);

        assert_eq!(tags.get("env"), Some("prod"));
        assert_eq!(tags.get("host"), Some("a"));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn convention_tags_apply_the_convention() {
        let id = Id::new("http.server.requests", MeterKind::Timer).with_tag("status.code", "200");

        assert_eq!(id.convention_name(&naming::SnakeCase), "http_server_requests");
        assert_eq!(
            id.convention_tags(&naming::SnakeCase),
            [("status_code".to_string(), "200".to_string())]
        );
    }

    #[test]
    fn display_includes_tags() {
        let id = Id::new("jobs", MeterKind::Counter).with_tags(Tags::of([("b", "2"), ("a", "1")]));

        assert_eq!(id.to_string(), "jobs{a=1,b=2}");
    }
}
