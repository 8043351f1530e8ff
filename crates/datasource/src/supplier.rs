//! Suppliers: configuration-bound recipes for starting one data source.

use std::sync::Arc;

use crate::config::DataSourceConfig;
use crate::data_source::ManagedDataSource;
use crate::error::Result;

/// Knows how to start one named data source on demand.
///
/// Suppliers are immutable once built. The factory calls
/// [`start`](DataSourceSupplier::start) at most once per successful startup;
/// a failed start is not cached and may be retried by a later lookup.
pub trait DataSourceSupplier: Send + Sync {
    /// Connection URL, available before the data source is started.
    fn url(&self) -> &str;

    /// Start the data source.
    fn start(&self) -> Result<ManagedDataSource>;
}

/// Builds suppliers of one backing type from configuration.
///
/// One provider exists per pool library (or test stub); the factory builder
/// picks the provider whose [`kind`](SupplierProvider::kind) matches the
/// configured `type`.
pub trait SupplierProvider: Send + Sync {
    /// The `type` value this provider answers to.
    fn kind(&self) -> &str;

    /// Create a supplier for data source `name`.
    fn create_supplier(
        &self,
        name: &str,
        config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSourceSupplier>>;
}
