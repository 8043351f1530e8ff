//! # Nebula Data Source Instrumentation
//!
//! Lifecycle listeners that attach metrics and health checks to data sources
//! as they start, and detach them on shutdown.
//!
//! ```rust,ignore
//! let registry = Arc::new(HealthCheckRegistry::new());
//! let metrics = Arc::new(MetricsListener::new());
//!
//! let factory = LazyDataSourceFactory::builder()
//!     .provider(Arc::new(PoolProvider::new(connector)))
//!     .listener(Arc::new(HealthCheckListener::new(Arc::clone(&registry))))
//!     .listener(metrics.clone())
//!     .config(config)
//!     .build()?;
//!
//! factory.for_name("orders")?;
//! let outcomes = registry.run_all();
//! ```

pub mod checks;
pub mod health;
pub mod listener;
pub mod metrics;

pub use checks::{CanConnectCheck, ConnectivityCheck, HealthCheckConfig, Thresholds, WaitTimeCheck};
pub use health::{
    HealthCheck, HealthCheckOutcome, HealthCheckRegistry, HealthCheckStatus, worst_status,
};
pub use listener::HealthCheckListener;
pub use metrics::MetricsListener;
