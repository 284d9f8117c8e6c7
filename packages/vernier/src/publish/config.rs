use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings shared by every step-based exporter.
///
/// Exporter-specific configuration structures embed this one. All fields have defaults,
/// so an empty configuration document is valid.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use vernier::StepConfig;
///
/// let config = StepConfig {
///     step: Duration::from_secs(10),
///     ..StepConfig::default()
/// };
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.batch_size, 10_000);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
#[expect(
    clippy::exhaustive_structs,
    reason = "plain configuration data, constructed with struct update syntax"
)]
pub struct StepConfig {
    /// Whether the exporter publishes at all. A disabled exporter still accepts meters.
    pub enabled: bool,

    /// How often meters are published. Step-scoped statistics (counts, totals, maxima)
    /// describe one step each. Written as a human-readable duration, e.g. `"30s"`.
    #[serde(with = "humantime_serde")]
    pub step: Duration,

    /// The maximum number of meters serialized into one batch.
    pub batch_size: usize,
}

impl StepConfig {
    /// Checks that the settings can be used to publish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the step is zero or the batch size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.step.is_zero() {
            return Err(Error::invalid("step", "must be greater than zero"));
        }

        if self.batch_size == 0 {
            return Err(Error::invalid("batch_size", "must be greater than zero"));
        }

        Ok(())
    }
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            step: Duration::from_secs(60),
            batch_size: 10_000,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StepConfig::default();

        assert!(config.enabled);
        assert_eq!(config.step, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_step_and_batch() {
        let zero_step = StepConfig {
            step: Duration::ZERO,
            ..StepConfig::default()
        };
        let zero_batch = StepConfig {
            batch_size: 0,
            ..StepConfig::default()
        };

        assert!(matches!(
            zero_step.validate(),
            Err(Error::InvalidConfiguration { key, .. }) if key == "step"
        ));
        assert!(matches!(
            zero_batch.validate(),
            Err(Error::InvalidConfiguration { key, .. }) if key == "batch_size"
        ));
    }

    #[test]
    fn deserializes_human_readable_step() {
        let config: StepConfig = toml::from_str(
            r#"
            step = "15s"
            batch_size = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.step, Duration::from_secs(15));
        assert_eq!(config.batch_size, 500);
        assert!(config.enabled);
    }
}
