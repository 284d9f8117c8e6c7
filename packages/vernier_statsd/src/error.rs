use thiserror::Error;

/// Errors specific to the StatsD exporter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The flavor name does not match any supported StatsD flavor.
    #[error("unsupported StatsD flavor '{flavor}', expected one of: datadog, telegraf, sysdig")]
    UnsupportedFlavor {
        /// The name that was given.
        flavor: String,
    },
}

impl From<Error> for vernier::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::UnsupportedFlavor { .. } => Self::invalid("flavor", error.to_string()),
        }
    }
}
