//! Data source handles and their managed wrapper.
//!
//! A [`DataSource`] is the handle callers receive from the factory. A
//! [`ManagedDataSource`] pairs that handle with the shutdown logic of the
//! library that built it; only the factory ever sees the managed wrapper.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;

// ---------------------------------------------------------------------------
// PoolStatus
// ---------------------------------------------------------------------------

/// Point-in-time view of a data source's connection pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Connections currently open (idle and checked out).
    pub connections: u32,
    /// Open connections sitting idle in the pool.
    pub idle_connections: u32,
    /// Maximum pool size.
    pub max_size: u32,
    /// Successful checkouts since startup.
    pub checkouts: u64,
    /// Checkouts that gave up waiting for a connection.
    pub timeouts: u64,
    /// 99th percentile of checkout wait time, if any checkouts were seen.
    pub wait_p99: Option<Duration>,
}

impl PoolStatus {
    /// Connections currently checked out by callers.
    #[must_use]
    pub fn active_connections(&self) -> u32 {
        self.connections.saturating_sub(self.idle_connections)
    }
}

// ---------------------------------------------------------------------------
// DataSource
// ---------------------------------------------------------------------------

/// A started data source.
///
/// The factory hands these out as `Arc<dyn DataSource>`. Callers that need
/// the concrete pool type (e.g. to check out a typed connection) downcast
/// through [`as_any`](DataSource::as_any).
pub trait DataSource: Send + Sync + 'static {
    /// Backing implementation name (e.g. `"r2d2"`).
    fn kind(&self) -> &str;

    /// Connection URL this data source was started with.
    fn url(&self) -> &str;

    /// Current pool status. Implementations without a pool report zeros.
    fn status(&self) -> PoolStatus {
        PoolStatus::default()
    }

    /// Obtain and release one connection, returning how long it took.
    fn check_connection(&self, timeout: Duration) -> Result<Duration>;

    /// Access the concrete type for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("kind", &self.kind())
            .field("url", &self.url())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ManagedDataSource
// ---------------------------------------------------------------------------

type ShutdownFn = Box<dyn Fn(&dyn DataSource) -> Result<()> + Send + Sync>;

/// A started data source plus the means to stop it.
pub struct ManagedDataSource {
    url: String,
    data_source: Arc<dyn DataSource>,
    shutdown: ShutdownFn,
}

impl ManagedDataSource {
    /// Wrap `data_source`, stopping it with `shutdown` when the factory shuts down.
    pub fn new<F>(url: impl Into<String>, data_source: Arc<dyn DataSource>, shutdown: F) -> Self
    where
        F: Fn(&dyn DataSource) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            url: url.into(),
            data_source,
            shutdown: Box::new(shutdown),
        }
    }

    /// Connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The handle handed out to callers.
    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    /// Stop the underlying data source.
    pub fn shutdown(&self) -> Result<()> {
        (self.shutdown)(self.data_source.as_ref())
    }
}

impl std::fmt::Debug for ManagedDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedDataSource")
            .field("url", &self.url)
            .field("kind", &self.data_source.kind())
            .finish()
    }
}
