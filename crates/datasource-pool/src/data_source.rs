//! `PooledDataSource`: an r2d2 pool exposed as a [`DataSource`].

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nebula_datasource::{DataSource, Error, PoolStatus, Result};
use parking_lot::RwLock;
use r2d2::{ManageConnection, Pool, PooledConnection};

use crate::events::WaitTimeRecorder;

/// Backing implementation name reported by [`DataSource::kind`].
pub const KIND: &str = "r2d2";

/// A started r2d2 connection pool.
///
/// Callers holding the `Arc<dyn DataSource>` handle downcast to
/// `PooledDataSource<M>` to check out typed connections. After
/// [`close`](Self::close) every checkout fails with [`Error::Closed`];
/// connections already checked out stay valid until dropped.
pub struct PooledDataSource<M: ManageConnection> {
    name: String,
    url: String,
    max_size: u32,
    pool: RwLock<Option<Pool<M>>>,
    recorder: Arc<WaitTimeRecorder>,
}

impl<M: ManageConnection> PooledDataSource<M> {
    pub(crate) fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        pool: Pool<M>,
        recorder: Arc<WaitTimeRecorder>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            max_size: pool.max_size(),
            pool: RwLock::new(Some(pool)),
            recorder,
        }
    }

    /// Data source name this pool was started for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check out a connection, waiting up to the configured connection timeout.
    pub fn get(&self) -> Result<PooledConnection<M>> {
        self.pool()?
            .get()
            .map_err(|e| Error::unavailable(&self.name, e.to_string(), true))
    }

    /// Check out a connection, waiting at most `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<PooledConnection<M>> {
        self.pool()?
            .get_timeout(timeout)
            .map_err(|e| Error::unavailable(&self.name, e.to_string(), true))
    }

    /// Release the pool. Idle connections close once the last checked-out
    /// connection is returned. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let closed = self.pool.write().take().is_some();
        if closed {
            tracing::debug!(data_source = %self.name, "Connection pool released");
        }
        closed
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.read().is_none()
    }

    /// Checkout statistics.
    pub fn wait_times(&self) -> &WaitTimeRecorder {
        &self.recorder
    }

    /// Clone the pool handle out so the lock is not held while waiting.
    fn pool(&self) -> Result<Pool<M>> {
        self.pool
            .read()
            .clone()
            .ok_or_else(|| Error::closed(&self.name))
    }
}

impl<M: ManageConnection> DataSource for PooledDataSource<M> {
    fn kind(&self) -> &str {
        KIND
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn status(&self) -> PoolStatus {
        let (connections, idle_connections) = match self.pool.read().as_ref() {
            Some(pool) => {
                let state = pool.state();
                (state.connections, state.idle_connections)
            }
            None => (0, 0),
        };
        PoolStatus {
            connections,
            idle_connections,
            max_size: self.max_size,
            checkouts: self.recorder.checkouts(),
            timeouts: self.recorder.timeouts(),
            wait_p99: self.recorder.percentile(0.99),
        }
    }

    fn check_connection(&self, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        let connection = self.get_timeout(timeout)?;
        let elapsed = started.elapsed();
        drop(connection);
        Ok(elapsed)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<M: ManageConnection> std::fmt::Debug for PooledDataSource<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDataSource")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("max_size", &self.max_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
