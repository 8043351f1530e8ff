//! # Nebula Data Source Pools
//!
//! Connection pools backed by [`r2d2`], started lazily through
//! [`LazyDataSourceFactory`](nebula_datasource::LazyDataSourceFactory).
//!
//! Register a [`PoolProvider`] and configure data sources with
//! `"type": "r2d2"`:
//!
//! ```json
//! {
//!   "orders": {
//!     "type": "r2d2",
//!     "url": "postgres://db/orders",
//!     "max_size": 20,
//!     "connection_timeout_ms": 5000
//!   }
//! }
//! ```
//!
//! The handle returned by `for_name` downcasts to [`PooledDataSource`] for
//! typed checkouts.

pub mod config;
pub mod data_source;
pub mod events;
pub mod supplier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::PoolConfig;
pub use data_source::{KIND, PooledDataSource};
pub use events::WaitTimeRecorder;
pub use supplier::{Connector, PoolProvider, PoolSupplier};
