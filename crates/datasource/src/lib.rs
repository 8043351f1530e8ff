//! # Nebula Data Sources
//!
//! Named data sources that are started lazily, on first lookup, and shut down
//! together. Lifecycle listeners observe each startup and shutdown so other
//! subsystems (metrics, health checks) can attach to new data sources
//! without the factory knowing about them.
//!
//! - [`LazyDataSourceFactory`]: lookup by name with single-flight startup
//! - [`DataSourceSupplier`] / [`SupplierProvider`]: how a name becomes a data source
//! - [`DataSourceListener`]: lifecycle notifications
//! - [`DataSourcesConfig`]: serde bindings for configured data sources

pub mod config;
pub mod data_source;
pub mod error;
pub mod factory;
pub mod listener;
pub mod supplier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DataSourceConfig, DataSourcesConfig};
pub use data_source::{DataSource, ManagedDataSource, PoolStatus};
pub use error::{Error, Result};
pub use factory::{DataSourceFactoryBuilder, LazyDataSourceFactory};
pub use listener::{DataSourceListener, TracingListener};
pub use supplier::{DataSourceSupplier, SupplierProvider};
