//! Error types for data source management
use thiserror::Error;

/// Result type for data source operations
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for data source lookup, startup and shutdown
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is missing or invalid.
    ///
    /// Signals a programming or deployment mistake (e.g. requesting a name
    /// nobody configured), never a transient fault.
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
        /// The underlying error (e.g. a deserialization failure)
        #[source]
        source: Option<BoxError>,
    },

    /// Starting the data source failed
    #[error("Failed to start data source '{data_source}': {reason}")]
    Construction {
        /// The data source name
        data_source: String,
        /// The failure reason
        reason: String,
        /// The underlying error from the pool library or driver
        #[source]
        source: Option<BoxError>,
    },

    /// A lifecycle listener rejected a notification
    #[error("Listener '{listener}' failed for data source '{data_source}': {reason}")]
    Listener {
        /// The listener name
        listener: String,
        /// The data source name
        data_source: String,
        /// The failure reason
        reason: String,
    },

    /// A started data source could not hand out a connection
    #[error("Data source '{data_source}' is unavailable: {reason}")]
    Unavailable {
        /// The data source name
        data_source: String,
        /// The unavailability reason
        reason: String,
        /// Whether the data source might become available later
        retryable: bool,
    },

    /// The data source (or the whole factory) was shut down
    #[error("Data source '{data_source}' is shut down")]
    Closed {
        /// The data source name
        data_source: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error caused by `source`
    pub fn configuration_with<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Self::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a construction error without an underlying cause
    pub fn construction(data_source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Construction {
            data_source: data_source.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a construction error caused by `source`
    pub fn construction_with<E>(
        data_source: impl Into<String>,
        reason: impl Into<String>,
        source: E,
    ) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Construction {
            data_source: data_source.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Create a listener error
    pub fn listener(
        listener: impl Into<String>,
        data_source: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Listener {
            listener: listener.into(),
            data_source: data_source.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(
        data_source: impl Into<String>,
        reason: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::Unavailable {
            data_source: data_source.into(),
            reason: reason.into(),
            retryable,
        }
    }

    /// Create a closed error
    pub fn closed(data_source: impl Into<String>) -> Self {
        Self::Closed {
            data_source: data_source.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Construction failures are not retried by the factory, but a later
    /// lookup of the same name starts from scratch, so they count as retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { retryable, .. } => *retryable,
            Self::Construction { .. } => true,
            Self::Configuration { .. } | Self::Listener { .. } | Self::Closed { .. } => false,
        }
    }

    /// Get the data source name associated with this error (if any)
    #[must_use]
    pub fn data_source(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::Construction { data_source, .. }
            | Self::Listener { data_source, .. }
            | Self::Unavailable { data_source, .. }
            | Self::Closed { data_source } => Some(data_source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_has_no_data_source() {
        let err = Error::configuration("bad");
        assert!(err.data_source().is_none());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Configuration error: bad");
    }

    #[test]
    fn construction_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::construction_with("db1", "pool did not start", io);
        assert_eq!(err.data_source(), Some("db1"));
        assert!(err.is_retryable());
        let source = std::error::Error::source(&err).expect("source should be kept");
        assert_eq!(source.to_string(), "refused");
    }

    #[test]
    fn closed_error_is_terminal() {
        let err = Error::closed("db1");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Data source 'db1' is shut down");
    }
}
