//! Suppliers and the `r2d2` provider.

use std::sync::Arc;

use nebula_datasource::{
    DataSource, DataSourceConfig, DataSourceSupplier, Error, ManagedDataSource, Result,
    SupplierProvider,
};
use r2d2::ManageConnection;

use crate::config::PoolConfig;
use crate::data_source::{KIND, PooledDataSource};
use crate::events::{EventBridge, TracingErrorHandler, WaitTimeRecorder};

/// Turns a connection URL into an r2d2 connection manager.
pub type Connector<M> = Arc<dyn Fn(&str) -> Result<M> + Send + Sync>;

// ---------------------------------------------------------------------------
// PoolSupplier
// ---------------------------------------------------------------------------

/// Starts an r2d2 pool for one named data source.
pub struct PoolSupplier<M: ManageConnection> {
    name: String,
    url: String,
    config: PoolConfig,
    connector: Connector<M>,
}

impl<M: ManageConnection> PoolSupplier<M> {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        config: PoolConfig,
        connector: Connector<M>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            config,
            connector,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<M: ManageConnection> DataSourceSupplier for PoolSupplier<M> {
    fn url(&self) -> &str {
        &self.url
    }

    fn start(&self) -> Result<ManagedDataSource> {
        self.config.validate()?;
        let manager = (self.connector)(&self.url)?;

        let recorder = Arc::new(WaitTimeRecorder::default());
        let pool = self
            .config
            .builder()
            .event_handler(Box::new(EventBridge::new(&self.name, Arc::clone(&recorder))))
            .error_handler(Box::new(TracingErrorHandler::new(&self.name)))
            .build(manager)
            .map_err(|e| Error::construction_with(&self.name, "connection pool failed to start", e))?;

        let pooled = Arc::new(PooledDataSource::new(&self.name, &self.url, pool, recorder));
        let handle = Arc::clone(&pooled);
        Ok(ManagedDataSource::new(
            &self.url,
            pooled as Arc<dyn DataSource>,
            move |_| {
                handle.close();
                Ok(())
            },
        ))
    }
}

impl<M: ManageConnection> std::fmt::Debug for PoolSupplier<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSupplier")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PoolProvider
// ---------------------------------------------------------------------------

/// [`SupplierProvider`] for `type: r2d2`.
///
/// The connector decides which driver's connection manager a URL maps to.
pub struct PoolProvider<M: ManageConnection> {
    connector: Connector<M>,
}

impl<M: ManageConnection> PoolProvider<M> {
    pub fn new<F>(connector: F) -> Self
    where
        F: Fn(&str) -> Result<M> + Send + Sync + 'static,
    {
        Self {
            connector: Arc::new(connector),
        }
    }
}

impl<M: ManageConnection> SupplierProvider for PoolProvider<M> {
    fn kind(&self) -> &str {
        KIND
    }

    fn create_supplier(
        &self,
        name: &str,
        config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSourceSupplier>> {
        let pool_config: PoolConfig = config.settings_as()?;
        pool_config.validate().map_err(|e| match e {
            Error::Configuration { message, source } => Error::Configuration {
                message: format!("data source '{name}': {message}"),
                source,
            },
            other => other,
        })?;

        Ok(Arc::new(PoolSupplier::new(
            name,
            config.url.clone(),
            pool_config,
            Arc::clone(&self.connector),
        )))
    }
}

impl<M: ManageConnection> std::fmt::Debug for PoolProvider<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolProvider").field("kind", &KIND).finish()
    }
}
