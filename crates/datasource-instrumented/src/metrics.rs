//! Metrics for data source lifecycle and pool state.
//!
//! Translates lifecycle notifications into counters and histograms via the
//! `metrics` crate. Pool gauges are published on demand through
//! [`MetricsListener::report`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use nebula_datasource::{DataSource, DataSourceListener, Result};

/// Lifecycle listener recording startup and shutdown metrics.
///
/// | metric | kind |
/// |---|---|
/// | `datasource.startup.total` | counter |
/// | `datasource.startup.duration_seconds` | histogram |
/// | `datasource.shutdown.total` | counter |
/// | `datasource.live` | gauge |
/// | `datasource.pool.*` | gauges, see [`report`](Self::report) |
///
/// Every metric except `datasource.live` carries a `data_source` label.
#[derive(Default)]
pub struct MetricsListener {
    starting: DashMap<String, Instant>,
    live: DashMap<String, Arc<dyn DataSource>>,
}

impl MetricsListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of data sources started and not yet shut down.
    #[must_use]
    pub fn live_names(&self) -> BTreeSet<String> {
        self.live.iter().map(|e| e.key().clone()).collect()
    }

    /// Publish the current pool state of every live data source.
    pub fn report(&self) {
        let live: Vec<(String, Arc<dyn DataSource>)> = self
            .live
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        for (name, data_source) in live {
            let status = data_source.status();
            metrics::gauge!("datasource.pool.connections", "data_source" => name.clone())
                .set(f64::from(status.connections));
            metrics::gauge!("datasource.pool.idle_connections", "data_source" => name.clone())
                .set(f64::from(status.idle_connections));
            metrics::gauge!("datasource.pool.active_connections", "data_source" => name.clone())
                .set(f64::from(status.active_connections()));
            metrics::gauge!("datasource.pool.max_size", "data_source" => name.clone())
                .set(f64::from(status.max_size));
            metrics::counter!("datasource.pool.checkouts.total", "data_source" => name.clone())
                .absolute(status.checkouts);
            metrics::counter!("datasource.pool.timeouts.total", "data_source" => name.clone())
                .absolute(status.timeouts);
            if let Some(p99) = status.wait_p99 {
                metrics::gauge!("datasource.pool.wait_p99_seconds", "data_source" => name)
                    .set(p99.as_secs_f64());
            }
        }
    }

    fn publish_live(&self) {
        metrics::gauge!("datasource.live").set(self.live.len() as f64);
    }
}

impl DataSourceListener for MetricsListener {
    fn name(&self) -> &str {
        "metrics"
    }

    fn before_startup(&self, name: &str, _url: &str) -> Result<()> {
        self.starting.insert(name.to_owned(), Instant::now());
        Ok(())
    }

    fn after_startup(&self, name: &str, _url: &str, data_source: &Arc<dyn DataSource>) -> Result<()> {
        metrics::counter!("datasource.startup.total", "data_source" => name.to_owned()).increment(1);
        if let Some((_, started)) = self.starting.remove(name) {
            metrics::histogram!(
                "datasource.startup.duration_seconds",
                "data_source" => name.to_owned()
            )
            .record(started.elapsed().as_secs_f64());
        }
        self.live.insert(name.to_owned(), Arc::clone(data_source));
        self.publish_live();
        Ok(())
    }

    fn after_shutdown(&self, name: &str, _url: &str, _data_source: &Arc<dyn DataSource>) -> Result<()> {
        metrics::counter!("datasource.shutdown.total", "data_source" => name.to_owned()).increment(1);
        self.live.remove(name);
        self.publish_live();
        Ok(())
    }
}

impl std::fmt::Debug for MetricsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsListener")
            .field("live", &self.live_names())
            .finish()
    }
}
