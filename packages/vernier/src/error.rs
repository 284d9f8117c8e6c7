use thiserror::Error;

/// Errors that can occur when constructing or running an exporter.
///
/// Measurement operations never return errors. Everything here originates either from
/// validating configuration before a publisher starts or from serializing a batch of
/// records for a backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A setting required by the exporter was not provided or was empty.
    #[error("missing required configuration: '{key}' must be set")]
    MissingConfiguration {
        /// The name of the setting, as it appears in the configuration structure.
        key: String,
    },

    /// A setting was provided but its value cannot be used.
    #[error("invalid configuration: '{key}' is invalid: {problem}")]
    InvalidConfiguration {
        /// The name of the setting, as it appears in the configuration structure.
        key: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A batch of records could not be serialized into a payload.
    #[error("failed to encode payload for {backend}: {problem}")]
    Encoding {
        /// The name of the backend that attempted the encoding.
        backend: String,

        /// A human-readable description of the problem.
        problem: String,
    },
}

impl Error {
    /// Shorthand for [`Error::MissingConfiguration`].
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingConfiguration { key: key.into() }
    }

    /// Shorthand for [`Error::InvalidConfiguration`].
    #[must_use]
    pub fn invalid(key: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            problem: problem.into(),
        }
    }
}

/// A specialized `Result` type for vernier operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn missing_configuration_names_the_key() {
        let error = Error::missing("api_key");

        assert_eq!(
            error.to_string(),
            "missing required configuration: 'api_key' must be set"
        );
    }

    #[test]
    fn invalid_configuration_names_key_and_problem() {
        let error = Error::invalid("batch_size", "must be greater than zero");

        assert_eq!(
            error.to_string(),
            "invalid configuration: 'batch_size' is invalid: must be greater than zero"
        );
    }
}
