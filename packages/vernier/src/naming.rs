//! Naming conventions that turn the dot-separated names used in code into the style
//! a monitoring backend expects.

use std::fmt::Debug;

use crate::MeterKind;

/// Renders meter names and tag keys in the style of a particular backend.
///
/// Names and tag keys in code are written in lowercase dot-separated form, such as
/// `http.server.requests`. A convention rewrites them, e.g. into `http_server_requests`.
///
/// Exporters cache rendered names per convention instance. Replacing the convention of a
/// registry invalidates those caches; mutating the internals of a convention in use
/// does not.
pub trait NamingConvention: Debug + Send + Sync + 'static {
    /// Renders a meter name. The kind and base unit are available for conventions that
    /// add suffixes (e.g. `_total` for counters).
    fn name(&self, name: &str, kind: MeterKind, base_unit: Option<&str>) -> String;

    /// Renders a tag key.
    fn tag_key(&self, key: &str) -> String {
        self.name(key, MeterKind::Other, None)
    }

    /// Renders a tag value. Values are left alone by default.
    fn tag_value(&self, value: &str) -> String {
        value.to_string()
    }
}

/// Leaves names and tags exactly as written.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct Identity;

impl NamingConvention for Identity {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        name.to_string()
    }
}

/// Dot-separated lowercase, e.g. `http.server.requests`.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct Dot;

impl NamingConvention for Dot {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        segments(name).collect::<Vec<_>>().join(".")
    }
}

/// Underscore-separated, e.g. `http_server_requests`.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct SnakeCase;

impl NamingConvention for SnakeCase {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        segments(name).collect::<Vec<_>>().join("_")
    }
}

/// Lower camel case, e.g. `httpServerRequests`.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct CamelCase;

impl NamingConvention for CamelCase {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        camel_case(name, false)
    }
}

/// Upper camel case, e.g. `HttpServerRequests`.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct UpperCamelCase;

impl NamingConvention for UpperCamelCase {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        camel_case(name, true)
    }
}

/// Slash-separated, e.g. `http/server/requests`.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct Slashes;

impl NamingConvention for Slashes {
    fn name(&self, name: &str, _kind: MeterKind, _base_unit: Option<&str>) -> String {
        segments(name).collect::<Vec<_>>().join("/")
    }
}

// Empty segments (leading, trailing or doubled dots) are dropped.
fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split('.').filter(|segment| !segment.is_empty())
}

/// Joins the dot-separated segments of `name`, capitalizing the first character of every
/// segment after the first (and of the first too, if `capitalize_first`).
pub fn camel_case(name: &str, capitalize_first: bool) -> String {
    let mut result = String::with_capacity(name.len());

    for (index, segment) in segments(name).enumerate() {
        let mut chars = segment.chars();

        if let Some(first) = chars.next() {
            if index > 0 || capitalize_first {
                result.extend(first.to_uppercase());
            } else {
                result.push(first);
            }

            result.push_str(chars.as_str());
        }
    }

    result
}
