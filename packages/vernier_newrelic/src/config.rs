use std::fmt::{self, Debug};

use serde::{Deserialize, Serialize};
use vernier::{Error, Result, StepConfig};

/// The Insights API accepts at most this many events per request.
pub const MAX_EVENTS_PER_REQUEST: usize = 1000;

/// Settings of the New Relic exporter.
///
/// # Example
///
/// ```
/// use vernier_newrelic::NewRelicConfig;
///
/// let config: NewRelicConfig = toml::from_str(
///     r#"
///     step = "30s"
///     account_id = "12345"
///     api_key = "NRII-secret"
///     "#,
/// )
/// .unwrap();
///
/// assert!(config.validate().is_ok());
/// assert_eq!(
///     config.endpoint(),
///     "https://insights-collector.newrelic.com/v1/accounts/12345/events"
/// );
/// ```
#[derive(Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
#[expect(
    clippy::exhaustive_structs,
    reason = "plain configuration data, constructed with struct update syntax"
)]
pub struct NewRelicConfig {
    /// Publishing schedule and batching. The batch size is capped at
    /// [`MAX_EVENTS_PER_REQUEST`].
    #[serde(flatten)]
    pub step: StepConfig,

    /// The New Relic account that receives the events.
    pub account_id: String,

    /// Insert key of the Insights API.
    pub api_key: String,

    /// Base URI of the Insights collector.
    pub uri: String,

    /// The event type all meters are reported under. Ignored if
    /// `meter_name_event_type_enabled` is set.
    pub event_type: String,

    /// Reports every meter under an event type named after the meter, instead of under
    /// `event_type` with `metricName` and `metricType` attributes.
    pub meter_name_event_type_enabled: bool,
}

impl NewRelicConfig {
    /// Checks that the settings can be used to publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the step settings are invalid, or if the account, key or URI are
    /// missing, or if no event type is set while meters are not reported under their own
    /// event types.
    pub fn validate(&self) -> Result<()> {
        self.step.validate()?;

        if !self.meter_name_event_type_enabled && self.event_type.trim().is_empty() {
            return Err(Error::missing("event_type"));
        }

        if self.account_id.trim().is_empty() {
            return Err(Error::missing("account_id"));
        }

        if self.api_key.trim().is_empty() {
            return Err(Error::missing("api_key"));
        }

        if self.uri.trim().is_empty() {
            return Err(Error::missing("uri"));
        }

        Ok(())
    }

    /// Where batches of events are posted.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1/accounts/{}/events",
            self.uri.trim_end_matches('/'),
            self.account_id
        )
    }

    /// The step settings with the batch size capped at [`MAX_EVENTS_PER_REQUEST`].
    #[must_use]
    pub fn capped_step(&self) -> StepConfig {
        StepConfig {
            batch_size: self.step.batch_size.min(MAX_EVENTS_PER_REQUEST),
            ..self.step.clone()
        }
    }
}

impl Default for NewRelicConfig {
    fn default() -> Self {
        Self {
            step: StepConfig::default(),
            account_id: String::new(),
            api_key: String::new(),
            uri: "https://insights-collector.newrelic.com".to_string(),
            event_type: "VernierSample".to_string(),
            meter_name_event_type_enabled: false,
        }
    }
}

// The insert key stays out of logs.
impl Debug for NewRelicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewRelicConfig")
            .field("step", &self.step)
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .field("uri", &self.uri)
            .field("event_type", &self.event_type)
            .field(
                "meter_name_event_type_enabled",
                &self.meter_name_event_type_enabled,
            )
            .finish()
    }
}
