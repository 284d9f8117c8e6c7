use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vernier::NamingConvention;
use vernier::naming::{Dot, SnakeCase};

use crate::Error;

/// The dialect of the StatsD line protocol to produce.
///
/// StatsD servers agree on `name:value|type` but extend it with tags in incompatible ways.
///
/// | Flavor     | Counter `my.counter` = 4 with tag `host=a` |
/// |------------|--------------------------------------------|
/// | `Datadog`  | `my.counter:4\|c\|#host:a`                 |
/// | `Telegraf` | `my.counter,host=a:4\|c`                   |
/// | `Sysdig`   | `my.counter#host=a:4\|c`                   |
///
/// Parsing is case-insensitive:
///
/// ```
/// use vernier_statsd::Flavor;
///
/// assert_eq!("Telegraf".parse::<Flavor>().unwrap(), Flavor::Telegraf);
/// assert!("etsy".parse::<Flavor>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub enum Flavor {
    /// DogStatsD, as accepted by the Datadog agent.
    #[default]
    Datadog,

    /// The StatsD input plugin of Telegraf, using the InfluxDB tag syntax.
    Telegraf,

    /// The Sysdig agent.
    Sysdig,
}

impl Flavor {
    /// The naming convention the flavor's backend expects, unless the registry has been
    /// configured with another one.
    #[must_use]
    pub fn naming_convention(self) -> Arc<dyn NamingConvention> {
        match self {
            Self::Datadog | Self::Sysdig => Arc::new(Dot::default()),
            Self::Telegraf => Arc::new(SnakeCase::default()),
        }
    }

    /// The lowercase name of the flavor, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Datadog => "datadog",
            Self::Telegraf => "telegraf",
            Self::Sysdig => "sysdig",
        }
    }

    pub(crate) fn rules(self) -> &'static FlavorRules {
        match self {
            Self::Datadog => &DATADOG,
            Self::Telegraf => &TELEGRAF,
            Self::Sysdig => &SYSDIG,
        }
    }
}

impl FromStr for Flavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Datadog, Self::Telegraf, Self::Sysdig]
            .into_iter()
            .find(|flavor| flavor.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedFlavor {
                flavor: s.to_string(),
            })
    }
}

impl TryFrom<String> for Flavor {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Flavor> for String {
    fn from(flavor: Flavor) -> Self {
        flavor.as_str().to_string()
    }
}

impl Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the tag block goes relative to the value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Layout {
    /// `name:value|type<tags>`
    TagsAfterValue,

    /// `name<tags>:value|type`
    TagsBeforeValue,
}

/// Everything that distinguishes one flavor from another. One generic line builder
/// consumes these tables.
#[derive(Debug)]
pub(crate) struct FlavorRules {
    pub(crate) layout: Layout,

    /// Between the key and value of one tag.
    pub(crate) key_value_separator: &'static str,

    /// Precedes a non-empty tag block.
    pub(crate) tag_preamble: &'static str,

    /// Whether the raw name is sanitized before the naming convention is applied, rather
    /// than the rendered name after.
    pub(crate) sanitize_before_convention: bool,

    pub(crate) sanitize_name: fn(&str) -> String,

    /// Renders one tag from a key and value that already went through the convention.
    pub(crate) format_tag: fn(&str, &str) -> String,
}

static DATADOG: FlavorRules = FlavorRules {
    layout: Layout::TagsAfterValue,
    key_value_separator: ":",
    tag_preamble: "|#",
    sanitize_before_convention: true,
    sanitize_name: datadog_name,
    format_tag: datadog_tag,
};

static TELEGRAF: FlavorRules = FlavorRules {
    layout: Layout::TagsBeforeValue,
    key_value_separator: "=",
    tag_preamble: ",",
    sanitize_before_convention: false,
    sanitize_name: telegraf_escape,
    format_tag: telegraf_tag,
};

static SYSDIG: FlavorRules = FlavorRules {
    layout: Layout::TagsBeforeValue,
    key_value_separator: "=",
    tag_preamble: "#",
    sanitize_before_convention: false,
    sanitize_name: sysdig_sanitize,
    format_tag: sysdig_tag,
};

// Datadog requires names to start with a letter and reserves ':' as the key/value separator.
fn datadog_name(name: &str) -> String {
    let sanitized = name.replace(':', "_");

    if name.chars().next().is_some_and(char::is_alphabetic) {
        sanitized
    } else {
        format!("m.{sanitized}")
    }
}

fn datadog_tag(key: &str, value: &str) -> String {
    let key = datadog_name(key);

    if value.is_empty() {
        return key;
    }

    value.strip_suffix(':').map_or_else(
        || format!("{key}:{value}"),
        |head| format!("{key}:{head}_"),
    )
}

// Telegraf honors an escaped '='. Escaped whitespace, commas and colons are not honored,
// so those are replaced.
fn telegraf_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '=' => escaped.push_str("\\="),
            ',' | ':' => escaped.push('_'),
            c if c.is_whitespace() => escaped.push('_'),
            c => escaped.push(c),
        }
    }

    escaped
}

fn telegraf_tag(key: &str, value: &str) -> String {
    format!("{}={}", telegraf_escape(key), telegraf_escape(value))
}

fn sysdig_sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn sysdig_tag(key: &str, value: &str) -> String {
    format!("{}={}", sysdig_sanitize(key), sysdig_sanitize(value))
}
