use std::fmt::Debug;

use futures::future::BoxFuture;
use thiserror::Error;

/// A serialized batch of records, ready to be transmitted to a backend.
///
/// What the fields mean depends on the transport. An HTTP transport would POST the body to
/// the URI with the headers; a UDP transport would ignore everything except the body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payload {
    uri: Option<String>,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    body: String,
    records: usize,
}

impl Payload {
    /// Creates a payload with the given body, holding `records` records.
    #[must_use]
    pub fn new(body: impl Into<String>, records: usize) -> Self {
        Self {
            uri: None,
            headers: Vec::new(),
            content_type: None,
            body: body.into(),
            records,
        }
    }

    /// Sets the destination of the payload.
    #[must_use]
    pub fn with_uri(self, uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..self
        }
    }

    /// Adds a header to send along with the payload.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the media type of the body.
    #[must_use]
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            ..self
        }
    }

    /// The destination of the payload, if the transport needs one.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Headers to send along with the payload.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The value of the first header with the given name (case-insensitive), if any.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The media type of the body, if the transport needs one.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The serialized records.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// How many records the body holds.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }
}

/// What the backend answered to a payload.
///
/// Transports without a notion of a status (e.g. UDP) report 200 after handing the payload
/// to the operating system.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    code: u16,
    body: String,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(code: u16, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// The status code, using HTTP semantics.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The body of the response, typically an error description if the payload was rejected.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether the backend accepted the payload (a 2xx code).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// The payload never reached the backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendError {
    /// The transport failed, e.g. the connection was refused or timed out.
    #[error("transport failed: {message}")]
    Transport {
        /// A human-readable description of the failure.
        message: String,
    },
}

impl SendError {
    /// Shorthand for [`SendError::Transport`].
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Transmits payloads to a monitoring backend.
///
/// Implement this with whatever transport the application already uses (an HTTP client,
/// a UDP socket, ...). Publishers call `send()` from within a Tokio runtime and drive the
/// returned future on a separate task, never awaiting it on the publishing path.
///
/// A failed send is logged and counted; the payload is not retried.
#[cfg_attr(test, mockall::automock)]
pub trait Sender: Debug + Send + Sync + 'static {
    /// Starts transmitting a payload.
    fn send(&self, payload: Payload) -> BoxFuture<'static, Result<Response, SendError>>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Payload: Send, Sync);
    assert_impl_all!(SendError: Send, Sync);

    #[test]
    fn payload_builder() {
        let payload = Payload::new("[]", 0)
            .with_uri("https://example.com/events")
            .with_header("X-Insert-Key", "secret")
            .with_content_type("application/json");

        assert_eq!(payload.uri(), Some("https://example.com/events"));
        assert_eq!(payload.header("x-insert-key"), Some("secret"));
        assert_eq!(payload.header("missing"), None);
        assert_eq!(payload.content_type(), Some("application/json"));
        assert_eq!(payload.body(), "[]");
        assert_eq!(payload.records(), 0);
    }

    #[test]
    fn success_is_2xx() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(199, "").is_success());
        assert!(!Response::new(400, "bad request").is_success());
        assert!(!Response::new(503, "").is_success());
    }
}
