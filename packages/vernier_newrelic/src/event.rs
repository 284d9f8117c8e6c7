use std::sync::Arc;

use serde_json::{Map, Value};
use vernier::{Id, MeterKind, NamingCache, NamingConvention, RenderRules};

/// One Insights event: a flat JSON object of attributes.
pub(crate) type Event = Map<String, Value>;

/// Builds the events of one meter, caching its rendered name and tags per naming
/// convention instance.
#[derive(Debug)]
pub(crate) struct EventBuilder {
    cache: NamingCache<EventRenderer>,
}

impl EventBuilder {
    pub(crate) fn new(id: Arc<Id>) -> Self {
        Self {
            cache: NamingCache::new(id, Arc::new(EventRenderer)),
        }
    }

    /// An event carrying `attributes` followed by the meter tags.
    ///
    /// With `event_type` set, all meters share that event type and the event names the
    /// meter in `metricName` and `metricType`. Otherwise the meter name is the event type.
    /// Tags never replace the attributes set before them.
    pub(crate) fn event(
        &self,
        convention: &Arc<dyn NamingConvention>,
        event_type: Option<&str>,
        attributes: impl IntoIterator<Item = (String, Value)>,
    ) -> Event {
        let rendered = self.cache.render(convention);
        let identity = rendered.fragments();

        let mut event = Map::new();

        event.insert(
            "eventType".to_string(),
            Value::from(event_type.unwrap_or(&identity.name)),
        );

        event.extend(attributes);

        if event_type.is_some() {
            event.insert("metricName".to_string(), Value::from(identity.name.as_str()));
            event.insert("metricType".to_string(), Value::from(identity.kind));
        }

        for (key, value) in &identity.tags {
            event
                .entry(key.clone())
                .or_insert_with(|| Value::from(value.as_str()));
        }

        event
    }
}

#[derive(Debug)]
struct EventRenderer;

#[derive(Debug)]
struct EventIdentity {
    name: String,
    kind: &'static str,
    tags: Vec<(String, String)>,
}

impl RenderRules for EventRenderer {
    type Fragments = EventIdentity;

    fn render(&self, id: &Id, convention: &dyn NamingConvention) -> EventIdentity {
        EventIdentity {
            name: id.convention_name(convention),
            kind: metric_type(id.kind()),
            tags: id.convention_tags(convention),
        }
    }
}

/// The upper-case meter type dashboards filter `metricType` by. Function meters report
/// the type of the meter they stand in for.
fn metric_type(kind: MeterKind) -> &'static str {
    match kind {
        MeterKind::Counter | MeterKind::FunctionCounter => "COUNTER",
        MeterKind::Gauge => "GAUGE",
        MeterKind::Timer | MeterKind::FunctionTimer => "TIMER",
        MeterKind::DistributionSummary => "DISTRIBUTION_SUMMARY",
        MeterKind::LongTaskTimer => "LONG_TASK_TIMER",
        MeterKind::Other => "OTHER",
    }
}
