//! Lifecycle listeners notified around data source startup and shutdown.
//!
//! Listeners are invoked synchronously, in registration order. A failing
//! listener is not isolated: its error aborts the operation in progress and
//! is returned to whoever triggered it.

use std::sync::Arc;

use crate::data_source::DataSource;
use crate::error::Result;

/// Observer of data source lifecycle boundaries.
///
/// Implementations must tolerate concurrent calls for *different* names.
/// Calls for the same name are serialized by the factory. A listener must not
/// look up the data source it is currently being notified about.
pub trait DataSourceListener: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Called before the data source `name` is started.
    fn before_startup(&self, _name: &str, _url: &str) -> Result<()> {
        Ok(())
    }

    /// Called after `name` started, before the handle is handed to anyone.
    fn after_startup(&self, _name: &str, _url: &str, _data_source: &Arc<dyn DataSource>) -> Result<()> {
        Ok(())
    }

    /// Called after `name` was shut down.
    fn after_shutdown(&self, _name: &str, _url: &str, _data_source: &Arc<dyn DataSource>) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in listeners
// ---------------------------------------------------------------------------

/// Audit listener that logs every lifecycle notification via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl DataSourceListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    fn before_startup(&self, name: &str, url: &str) -> Result<()> {
        tracing::debug!(data_source = name, url, phase = "before_startup", "Data source lifecycle");
        Ok(())
    }

    fn after_startup(&self, name: &str, url: &str, data_source: &Arc<dyn DataSource>) -> Result<()> {
        tracing::info!(
            data_source = name,
            url,
            kind = data_source.kind(),
            phase = "after_startup",
            "Data source lifecycle"
        );
        Ok(())
    }

    fn after_shutdown(&self, name: &str, url: &str, data_source: &Arc<dyn DataSource>) -> Result<()> {
        tracing::info!(
            data_source = name,
            url,
            kind = data_source.kind(),
            phase = "after_shutdown",
            "Data source lifecycle"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubDataSource;

    #[test]
    fn tracing_listener_accepts_all_notifications() {
        let listener = TracingListener;
        let ds: Arc<dyn DataSource> = Arc::new(StubDataSource::new("db", "mem://db"));

        assert_eq!(listener.name(), "tracing");
        listener.before_startup("db", "mem://db").unwrap();
        listener.after_startup("db", "mem://db", &ds).unwrap();
        listener.after_shutdown("db", "mem://db", &ds).unwrap();
    }
}
