//! Health check types and the on-demand registry
//!
//! Checks are registered by name and executed when [`HealthCheckRegistry::run_all`]
//! is called; scheduling is left to the embedding application.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Result category of a single health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckStatus {
    /// Everything within limits
    Ok,
    /// Degraded but usable
    Warning,
    /// Not usable
    Critical,
    /// The check could not produce a verdict
    Unknown,
}

impl HealthCheckStatus {
    /// Severity rank used to pick the worst of several outcomes.
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Unknown => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for HealthCheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// What a health check reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckOutcome {
    /// The verdict
    pub status: HealthCheckStatus,
    /// Human-readable detail
    pub message: String,
    /// Measured latency, when the check measures one
    pub latency: Option<Duration>,
}

impl HealthCheckOutcome {
    fn with_status(status: HealthCheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            latency: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_status(HealthCheckStatus::Ok, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_status(HealthCheckStatus::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::with_status(HealthCheckStatus::Critical, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::with_status(HealthCheckStatus::Unknown, message)
    }

    /// Attach the measured latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Whether the status is [`HealthCheckStatus::Ok`]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == HealthCheckStatus::Ok
    }
}

/// A named, synchronous health probe
pub trait HealthCheck: Send + Sync {
    /// Registry key, unique across the application
    fn name(&self) -> &str;

    /// Run the check
    fn check(&self) -> HealthCheckOutcome;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Thread-safe set of health checks keyed by name.
#[derive(Default)]
pub struct HealthCheckRegistry {
    checks: DashMap<String, Arc<dyn HealthCheck>>,
}

impl HealthCheckRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `check`, replacing (and returning) any check with the same name.
    pub fn register(&self, check: Arc<dyn HealthCheck>) -> Option<Arc<dyn HealthCheck>> {
        let name = check.name().to_owned();
        let previous = self.checks.insert(name.clone(), check);
        if previous.is_some() {
            tracing::debug!(check = %name, "Replaced health check");
        }
        previous
    }

    /// Remove the check called `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn HealthCheck>> {
        self.checks.remove(name).map(|(_, check)| check)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    /// Registered check names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run one check by name.
    pub fn run(&self, name: &str) -> Option<HealthCheckOutcome> {
        // Clone the Arc out so the shard lock is not held while checking.
        let check = self.checks.get(name).map(|e| Arc::clone(e.value()))?;
        Some(check.check())
    }

    /// Run every registered check.
    pub fn run_all(&self) -> BTreeMap<String, HealthCheckOutcome> {
        let checks: Vec<Arc<dyn HealthCheck>> =
            self.checks.iter().map(|e| Arc::clone(e.value())).collect();

        checks
            .into_iter()
            .map(|check| {
                let outcome = check.check();
                if !outcome.is_ok() {
                    tracing::warn!(
                        check = check.name(),
                        status = %outcome.status,
                        message = %outcome.message,
                        "Health check not ok"
                    );
                }
                (check.name().to_owned(), outcome)
            })
            .collect()
    }
}

/// The most severe status among `outcomes`, or `Ok` when there are none.
pub fn worst_status<'a>(
    outcomes: impl IntoIterator<Item = &'a HealthCheckOutcome>,
) -> HealthCheckStatus {
    outcomes
        .into_iter()
        .map(|o| o.status)
        .max_by_key(|s| s.severity())
        .unwrap_or(HealthCheckStatus::Ok)
}

impl std::fmt::Debug for HealthCheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}
