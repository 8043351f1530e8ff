//! Pool configuration types

use std::time::Duration;

use nebula_datasource::{Error, Result};
use serde::{Deserialize, Serialize};

/// Durations are written as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Optional durations as integer milliseconds; `null` disables the limit.
mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

/// Configuration for an r2d2-backed data source's connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections
    pub max_size: u32,
    /// Idle connections the pool keeps open; also the number of connections
    /// that must open successfully for startup to succeed
    pub min_idle: u32,
    /// How long a checkout (or startup) waits for a connection
    #[serde(rename = "connection_timeout_ms", with = "duration_ms")]
    pub connection_timeout: Duration,
    /// Idle connections older than this are closed
    #[serde(rename = "idle_timeout_ms", with = "opt_duration_ms")]
    pub idle_timeout: Option<Duration>,
    /// Connections older than this are closed
    #[serde(rename = "max_lifetime_ms", with = "opt_duration_ms")]
    pub max_lifetime: Option<Duration>,
    /// Validate connections before handing them out
    pub test_on_check_out: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 1,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_on_check_out: true,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    ///
    /// r2d2 panics on these values, so they must be rejected up front.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_idle > self.max_size {
            return Err(Error::configuration(format!(
                "min_idle ({}) must not exceed max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        if self.connection_timeout.is_zero() {
            return Err(Error::configuration(
                "connection_timeout_ms must be greater than zero",
            ));
        }
        if self.idle_timeout.is_some_and(|d| d.is_zero()) {
            return Err(Error::configuration("idle_timeout_ms must be greater than zero"));
        }
        if self.max_lifetime.is_some_and(|d| d.is_zero()) {
            return Err(Error::configuration("max_lifetime_ms must be greater than zero"));
        }
        Ok(())
    }

    /// An r2d2 builder carrying these settings.
    pub(crate) fn builder<M: r2d2::ManageConnection>(&self) -> r2d2::Builder<M> {
        r2d2::Pool::builder()
            .max_size(self.max_size)
            .min_idle(Some(self.min_idle))
            .connection_timeout(self.connection_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_on_check_out(self.test_on_check_out)
    }
}
