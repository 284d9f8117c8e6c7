use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use vernier::{Error, Result, StepConfig};

use crate::Flavor;

/// Settings of the StatsD exporter.
///
/// # Example
///
/// ```
/// use vernier_statsd::{Flavor, StatsdConfig};
///
/// let config: StatsdConfig = toml::from_str(
///     r#"
///     step = "10s"
///     flavor = "telegraf"
///     host = "statsd.internal"
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.flavor, Flavor::Telegraf);
/// assert_eq!(config.port, 8125);
/// assert_eq!(config.address(), "udp://statsd.internal:8125");
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
#[expect(
    clippy::exhaustive_structs,
    reason = "plain configuration data, constructed with struct update syntax"
)]
pub struct StatsdConfig {
    /// Publishing schedule and batching.
    #[serde(flatten)]
    pub step: StepConfig,

    /// The line protocol dialect of the receiving agent.
    pub flavor: Flavor,

    /// Host name of the receiving agent.
    pub host: String,

    /// Port of the receiving agent.
    pub port: u16,

    /// Transport the sender should use to reach the agent.
    pub protocol: Protocol,

    /// Lines are packed into payloads of at most this many bytes. Keep this below the MTU
    /// of the network path for UDP. A single line longer than this is sent on its own.
    pub max_packet_length: usize,
}

impl StatsdConfig {
    /// Checks that the settings can be used to publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the step settings are invalid, the host is empty or the port or
    /// maximum packet length is zero.
    pub fn validate(&self) -> Result<()> {
        self.step.validate()?;

        if self.host.trim().is_empty() {
            return Err(Error::missing("host"));
        }

        if self.port == 0 {
            return Err(Error::invalid("port", "must be greater than zero"));
        }

        if self.max_packet_length == 0 {
            return Err(Error::invalid(
                "max_packet_length",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Where payloads are sent, as `protocol://host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            step: StepConfig::default(),
            flavor: Flavor::default(),
            host: "localhost".to_string(),
            port: 8125,
            protocol: Protocol::default(),
            max_packet_length: 1400,
        }
    }
}

/// Transport used to reach a StatsD agent.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Protocol {
    /// Datagrams, the StatsD default.
    #[default]
    Udp,

    /// A stream connection.
    Tcp,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults() {
        let config = StatsdConfig::default();

        assert_eq!(config.flavor, Flavor::Datadog);
        assert_eq!(config.address(), "udp://localhost:8125");
        assert_eq!(config.max_packet_length, 1400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_gives_defaults() {
        let config: StatsdConfig = toml::from_str("").unwrap();

        assert_eq!(config, StatsdConfig::default());
    }

    #[test]
    fn full_document() {
        let config: StatsdConfig = toml::from_str(
            r#"
            enabled = false
            step = "15s"
            batch_size = 100
            flavor = "Sysdig"
            host = "10.0.0.7"
            port = 9125
            protocol = "tcp"
            max_packet_length = 8932
            "#,
        )
        .unwrap();

        assert!(!config.step.enabled);
        assert_eq!(config.step.step, Duration::from_secs(15));
        assert_eq!(config.step.batch_size, 100);
        assert_eq!(config.flavor, Flavor::Sysdig);
        assert_eq!(config.address(), "tcp://10.0.0.7:9125");
        assert_eq!(config.max_packet_length, 8932);
    }

    #[test]
    fn unknown_flavor_fails_deserialization() {
        let result = toml::from_str::<StatsdConfig>(r#"flavor = "etsy""#);

        assert!(result.unwrap_err().to_string().contains("etsy"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let empty_host = StatsdConfig {
            host: " ".to_string(),
            ..StatsdConfig::default()
        };
        let zero_port = StatsdConfig {
            port: 0,
            ..StatsdConfig::default()
        };
        let zero_packet = StatsdConfig {
            max_packet_length: 0,
            ..StatsdConfig::default()
        };

        assert!(matches!(
            empty_host.validate(),
            Err(Error::MissingConfiguration { .. })
        ));
        assert!(matches!(
            zero_port.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            zero_packet.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));
    }
}
