//! Testing utilities: stub data sources and recording listeners.
//!
//! Enabled for this crate's own tests and, for downstream crates, through
//! the `testing` feature.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::DataSourceConfig;
use crate::data_source::{DataSource, ManagedDataSource, PoolStatus};
use crate::error::{Error, Result};
use crate::listener::DataSourceListener;
use crate::supplier::{DataSourceSupplier, SupplierProvider};

// ---------------------------------------------------------------------------
// StubDataSource
// ---------------------------------------------------------------------------

/// In-memory data source that counts shutdowns and can be made unhealthy.
#[derive(Debug)]
pub struct StubDataSource {
    name: String,
    url: String,
    healthy: AtomicBool,
    shutdowns: AtomicU32,
}

impl StubDataSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            healthy: AtomicBool::new(true),
            shutdowns: AtomicU32::new(0),
        }
    }

    /// Make [`check_connection`](DataSource::check_connection) fail (or succeed again).
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// How many times this data source was shut down.
    pub fn shutdowns(&self) -> u32 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl DataSource for StubDataSource {
    fn kind(&self) -> &str {
        "stub"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            connections: 1,
            idle_connections: 1,
            max_size: 1,
            ..Default::default()
        }
    }

    fn check_connection(&self, _timeout: Duration) -> Result<Duration> {
        if self.shutdowns() > 0 {
            return Err(Error::closed(&self.name));
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(Error::unavailable(&self.name, "stub marked unhealthy", true));
        }
        Ok(Duration::ZERO)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// StubSupplier
// ---------------------------------------------------------------------------

/// Supplier producing [`StubDataSource`]s, with a start counter, optional
/// startup delay and a configurable number of failing starts.
#[derive(Debug)]
pub struct StubSupplier {
    name: String,
    url: String,
    delay: Duration,
    failures_left: AtomicU32,
    starts: AtomicU32,
    started: Mutex<Vec<Arc<StubDataSource>>>,
}

impl StubSupplier {
    /// The data source name defaults to the part of `url` after the scheme,
    /// so `mem://db1` reports errors for `db1`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest).to_owned();
        Self {
            name,
            url,
            delay: Duration::ZERO,
            failures_left: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Report errors for data source `name`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep for `delay` inside every start.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `n` starts with [`Error::Construction`].
    pub fn fail_times(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Number of start attempts, failed ones included.
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Every data source this supplier produced, in start order.
    pub fn started(&self) -> Vec<Arc<StubDataSource>> {
        self.started.lock().clone()
    }
}

impl DataSourceSupplier for StubSupplier {
    fn url(&self) -> &str {
        &self.url
    }

    fn start(&self) -> Result<ManagedDataSource> {
        let attempt = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::construction(
                &self.name,
                format!("stub start #{attempt} failed"),
            ));
        }

        let data_source = Arc::new(StubDataSource::new(&self.name, &self.url));
        self.started.lock().push(Arc::clone(&data_source));

        let handle = Arc::clone(&data_source);
        Ok(ManagedDataSource::new(&self.url, data_source, move |_| {
            handle.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }
}

/// Provider for `type: stub`.
#[derive(Debug, Default)]
pub struct StubProvider;

impl SupplierProvider for StubProvider {
    fn kind(&self) -> &str {
        "stub"
    }

    fn create_supplier(
        &self,
        name: &str,
        config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSourceSupplier>> {
        Ok(Arc::new(StubSupplier::new(config.url.clone()).with_name(name)))
    }
}

// ---------------------------------------------------------------------------
// RecordingListener
// ---------------------------------------------------------------------------

/// Lifecycle phase a listener was notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BeforeStartup,
    AfterStartup,
    AfterShutdown,
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerEvent {
    pub phase: Phase,
    pub name: String,
    pub url: String,
}

impl ListenerEvent {
    pub fn before_startup(name: &str, url: &str) -> Self {
        Self::new(Phase::BeforeStartup, name, url)
    }

    pub fn after_startup(name: &str, url: &str) -> Self {
        Self::new(Phase::AfterStartup, name, url)
    }

    pub fn after_shutdown(name: &str, url: &str) -> Self {
        Self::new(Phase::AfterShutdown, name, url)
    }

    fn new(phase: Phase, name: &str, url: &str) -> Self {
        Self {
            phase,
            name: name.to_owned(),
            url: url.to_owned(),
        }
    }
}

/// Listener that records every notification and the handles it was given.
#[derive(Debug)]
pub struct RecordingListener {
    name: String,
    fail_on: Option<Phase>,
    events: Mutex<Vec<ListenerEvent>>,
    handles: Mutex<Vec<(String, Arc<dyn DataSource>)>>,
}

impl RecordingListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_on: None,
            events: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Return an error from `before_startup` (after recording it).
    pub fn fail_before_startup(mut self) -> Self {
        self.fail_on = Some(Phase::BeforeStartup);
        self
    }

    /// Return an error from `after_startup` (after recording it).
    pub fn fail_after_startup(mut self) -> Self {
        self.fail_on = Some(Phase::AfterStartup);
        self
    }

    /// Return an error from `after_shutdown` (after recording it).
    pub fn fail_after_shutdown(mut self) -> Self {
        self.fail_on = Some(Phase::AfterShutdown);
        self
    }

    /// Everything recorded so far, in notification order.
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// Recorded events for one phase.
    pub fn events_for(&self, phase: Phase) -> Vec<ListenerEvent> {
        self.events.lock().iter().filter(|e| e.phase == phase).cloned().collect()
    }

    /// Handles received by `after_startup`, in notification order.
    pub fn started_handles(&self) -> Vec<(String, Arc<dyn DataSource>)> {
        self.handles.lock().clone()
    }

    fn record(&self, phase: Phase, name: &str, url: &str) -> Result<()> {
        self.events.lock().push(ListenerEvent::new(phase, name, url));
        if self.fail_on == Some(phase) {
            return Err(Error::listener(&self.name, name, format!("{phase:?} rejected")));
        }
        Ok(())
    }
}

impl DataSourceListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_startup(&self, name: &str, url: &str) -> Result<()> {
        self.record(Phase::BeforeStartup, name, url)
    }

    fn after_startup(&self, name: &str, url: &str, data_source: &Arc<dyn DataSource>) -> Result<()> {
        self.handles.lock().push((name.to_owned(), Arc::clone(data_source)));
        self.record(Phase::AfterStartup, name, url)
    }

    fn after_shutdown(&self, name: &str, url: &str, _data_source: &Arc<dyn DataSource>) -> Result<()> {
        self.record(Phase::AfterShutdown, name, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_errors_name_the_data_source() {
        let derived = StubSupplier::new("mem://db1").fail_times(1);
        let err = derived.start().unwrap_err();
        assert_eq!(err.data_source(), Some("db1"));

        let named = StubSupplier::new("mem://primary").with_name("orders").fail_times(1);
        let err = named.start().unwrap_err();
        assert_eq!(err.data_source(), Some("orders"));
        assert_eq!(named.url(), "mem://primary");
    }
}
