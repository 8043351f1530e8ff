//! Per-data-source health checks and their thresholds.

use std::sync::Arc;
use std::time::Duration;

use nebula_datasource::{DataSource, Error, Result};
use serde::{Deserialize, Serialize};

use crate::health::{HealthCheck, HealthCheckOutcome, HealthCheckStatus};

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

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Warning and critical limits for a measured duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(rename = "warning_ms", with = "duration_ms")]
    pub warning: Duration,
    #[serde(rename = "critical_ms", with = "duration_ms")]
    pub critical: Duration,
}

impl Thresholds {
    #[must_use]
    pub const fn new(warning: Duration, critical: Duration) -> Self {
        Self { warning, critical }
    }

    /// Status of `value` against these limits. Reaching a limit counts as
    /// crossing it.
    #[must_use]
    pub fn classify(&self, value: Duration) -> HealthCheckStatus {
        if value >= self.critical {
            HealthCheckStatus::Critical
        } else if value >= self.warning {
            HealthCheckStatus::Warning
        } else {
            HealthCheckStatus::Ok
        }
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.warning.is_zero() {
            return Err(Error::configuration(format!(
                "{what}.warning_ms must be greater than zero"
            )));
        }
        if self.warning > self.critical {
            return Err(Error::configuration(format!(
                "{what}.warning_ms ({}) must not exceed {what}.critical_ms ({})",
                self.warning.as_millis(),
                self.critical.as_millis()
            )));
        }
        Ok(())
    }
}

/// Health check settings for one data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// How long connectivity checks wait for a connection
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Limits on connection checkout latency
    pub connectivity: Thresholds,
    /// Limits on the 99th percentile checkout wait
    pub wait_p99: Thresholds,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            connectivity: Thresholds::new(Duration::from_millis(250), Duration::from_millis(1000)),
            wait_p99: Thresholds::new(Duration::from_millis(10), Duration::from_millis(500)),
        }
    }
}

impl HealthCheckConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::configuration("timeout_ms must be greater than zero"));
        }
        self.connectivity.validate("connectivity")?;
        self.wait_p99.validate("wait_p99")
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Can a connection be obtained at all?
pub struct CanConnectCheck {
    name: String,
    data_source: Arc<dyn DataSource>,
    timeout: Duration,
}

impl CanConnectCheck {
    pub fn new(data_source_name: &str, data_source: Arc<dyn DataSource>, timeout: Duration) -> Self {
        Self {
            name: Self::check_name(data_source_name),
            data_source,
            timeout,
        }
    }

    #[must_use]
    pub fn check_name(data_source_name: &str) -> String {
        format!("datasource.{data_source_name}.can_connect")
    }
}

impl HealthCheck for CanConnectCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> HealthCheckOutcome {
        match self.data_source.check_connection(self.timeout) {
            Ok(latency) => HealthCheckOutcome::ok("connection available").with_latency(latency),
            Err(e) => HealthCheckOutcome::critical(e.to_string()),
        }
    }
}

/// Connection checkout latency against [`Thresholds`].
pub struct ConnectivityCheck {
    name: String,
    data_source: Arc<dyn DataSource>,
    timeout: Duration,
    thresholds: Thresholds,
}

impl ConnectivityCheck {
    pub fn new(
        data_source_name: &str,
        data_source: Arc<dyn DataSource>,
        timeout: Duration,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            name: Self::check_name(data_source_name),
            data_source,
            timeout,
            thresholds,
        }
    }

    #[must_use]
    pub fn check_name(data_source_name: &str) -> String {
        format!("datasource.{data_source_name}.pool.connectivity")
    }
}

impl HealthCheck for ConnectivityCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> HealthCheckOutcome {
        let latency = match self.data_source.check_connection(self.timeout) {
            Ok(latency) => latency,
            Err(e) => return HealthCheckOutcome::critical(e.to_string()),
        };
        let message = format!("connection obtained in {} ms", latency.as_millis());
        let outcome = match self.thresholds.classify(latency) {
            HealthCheckStatus::Ok => HealthCheckOutcome::ok(message),
            HealthCheckStatus::Warning => HealthCheckOutcome::warning(message),
            _ => HealthCheckOutcome::critical(message),
        };
        outcome.with_latency(latency)
    }
}

/// 99th percentile of checkout wait times against [`Thresholds`].
pub struct WaitTimeCheck {
    name: String,
    data_source: Arc<dyn DataSource>,
    thresholds: Thresholds,
}

impl WaitTimeCheck {
    pub fn new(data_source_name: &str, data_source: Arc<dyn DataSource>, thresholds: Thresholds) -> Self {
        Self {
            name: Self::check_name(data_source_name),
            data_source,
            thresholds,
        }
    }

    #[must_use]
    pub fn check_name(data_source_name: &str) -> String {
        format!("datasource.{data_source_name}.pool.wait_p99")
    }
}

impl HealthCheck for WaitTimeCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> HealthCheckOutcome {
        let Some(p99) = self.data_source.status().wait_p99 else {
            return HealthCheckOutcome::ok("no checkouts recorded");
        };
        let message = format!("p99 checkout wait {} ms", p99.as_millis());
        let outcome = match self.thresholds.classify(p99) {
            HealthCheckStatus::Ok => HealthCheckOutcome::ok(message),
            HealthCheckStatus::Warning => HealthCheckOutcome::warning(message),
            _ => HealthCheckOutcome::critical(message),
        };
        outcome.with_latency(p99)
    }
}
