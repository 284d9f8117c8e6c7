use vernier::naming::camel_case;
use vernier::{MeterKind, NamingConvention};

/// Lower camel case names and attribute keys restricted to the characters New Relic
/// accepts in event types and attribute names: ASCII letters, digits, `_` and `:`.
///
/// ```
/// use vernier::{MeterKind, NamingConvention};
/// use vernier_newrelic::NewRelicNamingConvention;
///
/// let convention = NewRelicNamingConvention::default();
///
/// assert_eq!(
///     convention.name("http.server-requests", MeterKind::Timer, None),
///     "httpServer_requests"
/// );
/// ```
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct NewRelicNamingConvention;

impl NamingConvention for NewRelicNamingConvention {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        sanitize(&camel_case(name, false))
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
