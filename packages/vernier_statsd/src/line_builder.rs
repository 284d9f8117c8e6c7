use std::sync::Arc;

use vernier::{Id, NamingCache, NamingConvention, RenderRules, Statistic, StatisticRules};

use crate::flavor::{FlavorRules, Layout};

/// Renders the StatsD lines of one meter in one flavor.
///
/// The name and the tag block only depend on the meter identity and the naming convention,
/// so they are rendered once per convention instance and reused for every line.
#[derive(Debug)]
pub(crate) struct LineBuilder {
    cache: NamingCache<FlavorRenderer>,
}

impl LineBuilder {
    pub(crate) fn new(id: Arc<Id>, rules: &'static FlavorRules) -> Self {
        Self {
            cache: NamingCache::new(id, Arc::new(FlavorRenderer { rules })),
        }
    }

    /// One line for `amount`, tagged with `statistic` if given.
    pub(crate) fn line(
        &self,
        convention: &Arc<dyn NamingConvention>,
        amount: f64,
        statistic: Option<Statistic>,
        type_tag: &str,
    ) -> String {
        let rendered = self.cache.render(convention);
        let tags = self.cache.text(convention, statistic);

        compose(
            rendered.fragments().rules,
            &rendered.fragments().name,
            &tags,
            amount,
            type_tag,
        )
    }

    /// One line for a histogram bucket, tagged with the bucket's upper bound as `le`.
    pub(crate) fn bucket_line(
        &self,
        convention: &Arc<dyn NamingConvention>,
        amount: f64,
        le: f64,
        type_tag: &str,
    ) -> String {
        let rendered = self.cache.render(convention);
        let fragments = rendered.fragments();
        let rules = fragments.rules;

        let le_tag = (rules.format_tag)("le", &le.to_string());
        let tags = tag_block(rules, None, fragments.tags.as_deref(), Some(&le_tag));

        compose(rules, &fragments.name, &tags, amount, type_tag)
    }
}

fn compose(rules: &FlavorRules, name: &str, tags: &str, amount: f64, type_tag: &str) -> String {
    match rules.layout {
        Layout::TagsAfterValue => format!("{name}:{amount}|{type_tag}{tags}"),
        Layout::TagsBeforeValue => format!("{name}{tags}:{amount}|{type_tag}"),
    }
}

/// `statistic` first, then the meter tags, then any extra tag. Prefixed by the preamble
/// unless empty.
fn tag_block(
    rules: &FlavorRules,
    statistic: Option<Statistic>,
    meter_tags: Option<&str>,
    extra: Option<&str>,
) -> String {
    let statistic = statistic.map(|stat| {
        format!(
            "statistic{}{}",
            rules.key_value_separator,
            stat.tag_value()
        )
    });

    let parts: Vec<&str> = [statistic.as_deref(), meter_tags, extra]
        .into_iter()
        .flatten()
        .collect();

    if parts.is_empty() {
        String::new()
    } else {
        format!("{}{}", rules.tag_preamble, parts.join(","))
    }
}

#[derive(Debug)]
struct FlavorRenderer {
    rules: &'static FlavorRules,
}

#[derive(Debug)]
struct Fragments {
    rules: &'static FlavorRules,
    name: String,

    // `None` if the meter has no tags.
    tags: Option<String>,
}

impl RenderRules for FlavorRenderer {
    type Fragments = Fragments;

    fn render(&self, id: &Id, convention: &dyn NamingConvention) -> Fragments {
        let rules = self.rules;

        let name = if rules.sanitize_before_convention {
            convention.name(&(rules.sanitize_name)(id.name()), id.kind(), id.base_unit())
        } else {
            (rules.sanitize_name)(&convention.name(id.name(), id.kind(), id.base_unit()))
        };

        let tags = (!id.tags().is_empty()).then(|| {
            id.convention_tags(convention)
                .iter()
                .map(|(key, value)| (rules.format_tag)(key, value))
                .collect::<Vec<_>>()
                .join(",")
        });

        Fragments { rules, name, tags }
    }
}

impl StatisticRules for FlavorRenderer {
    fn render_statistic(&self, fragments: &Fragments, statistic: Option<Statistic>) -> String {
        tag_block(fragments.rules, statistic, fragments.tags.as_deref(), None)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use vernier::MeterKind;
    use vernier::naming::{Identity, SnakeCase};

    use super::*;
    use crate::Flavor;

    fn builder(flavor: Flavor, id: Id) -> LineBuilder {
        LineBuilder::new(Arc::new(id), flavor.rules())
    }

    fn counter_id() -> Id {
        Id::new("my.counter", MeterKind::Counter).with_tag("host", "a")
    }

    fn identity() -> Arc<dyn NamingConvention> {
        Arc::new(Identity::default())
    }

    #[test]
    fn datadog_counter() {
        let line = builder(Flavor::Datadog, counter_id()).line(&identity(), 4.0, None, "c");

        assert_eq!(line, "my.counter:4|c|#host:a");
    }

    #[test]
    fn telegraf_counter() {
        let line = builder(Flavor::Telegraf, counter_id()).line(&identity(), 4.0, None, "c");

        assert_eq!(line, "my.counter,host=a:4|c");
    }

    #[test]
    fn sysdig_counter() {
        let line = builder(Flavor::Sysdig, counter_id()).line(&identity(), 4.0, None, "c");

        assert_eq!(line, "my.counter#host=a:4|c");
    }

    #[test]
    fn statistic_tag_comes_first() {
        let convention = identity();

        let datadog = builder(Flavor::Datadog, counter_id()).line(
            &convention,
            4.5,
            Some(Statistic::Max),
            "g",
        );
        let telegraf = builder(Flavor::Telegraf, counter_id()).line(
            &convention,
            4.5,
            Some(Statistic::TotalTime),
            "c",
        );

        assert_eq!(datadog, "my.counter:4.5|g|#statistic:max,host:a");
        assert_eq!(telegraf, "my.counter,statistic=total_time,host=a:4.5|c");
    }

    #[test]
    fn untagged_meter_has_no_tag_block() {
        let id = Id::new("jobs", MeterKind::Gauge);
        let convention = identity();

        assert_eq!(
            builder(Flavor::Datadog, id.clone()).line(&convention, 1.0, None, "g"),
            "jobs:1|g"
        );
        assert_eq!(
            builder(Flavor::Sysdig, id.clone()).line(&convention, 1.0, None, "g"),
            "jobs:1|g"
        );
        assert_eq!(
            builder(Flavor::Telegraf, id).line(&convention, 1.0, Some(Statistic::Value), "g"),
            "jobs,statistic=value:1|g"
        );
    }

    #[test]
    fn datadog_sanitizes_before_convention() {
        // Without the prefix the convention would see a name starting with a digit.
        let id = Id::new("5xx.errors", MeterKind::Counter);
        let convention: Arc<dyn NamingConvention> = Arc::new(SnakeCase::default());

        let line = builder(Flavor::Datadog, id).line(&convention, 1.0, None, "c");

        assert_eq!(line, "m_5xx_errors:1|c");
    }

    #[test]
    fn telegraf_sanitizes_after_convention() {
        let id = Id::new("http.requests", MeterKind::Counter).with_tag("uri path", "/a,b=c");
        let convention: Arc<dyn NamingConvention> = Arc::new(SnakeCase::default());

        let line = builder(Flavor::Telegraf, id).line(&convention, 2.0, None, "c");

        assert_eq!(line, "http_requests,uri_path=/a_b\\=c:2|c");
    }

    #[test]
    fn bucket_lines_carry_le_tag() {
        let convention = identity();
        let builder = builder(Flavor::Datadog, counter_id());

        assert_eq!(
            builder.bucket_line(&convention, 3.0, 0.5, "g"),
            "my.counter:3|g|#host:a,le:0.5"
        );

        let untagged = LineBuilder::new(
            Arc::new(Id::new("latency", MeterKind::Timer)),
            Flavor::Telegraf.rules(),
        );
        assert_eq!(
            untagged.bucket_line(&convention, 7.0, 100.0, "g"),
            "latency,le=100:7|g"
        );
    }

    #[test]
    fn convention_change_rerenders() {
        let builder = builder(Flavor::Telegraf, counter_id());

        let dotted = builder.line(&identity(), 1.0, None, "c");
        let snake: Arc<dyn NamingConvention> = Arc::new(SnakeCase::default());
        let snaked = builder.line(&snake, 1.0, None, "c");

        assert_eq!(dotted, "my.counter,host=a:1|c");
        assert_eq!(snaked, "my_counter,host=a:1|c");
    }
}
