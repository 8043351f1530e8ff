//! `HealthCheckListener` keeps the health registry in step with started data sources.

use std::collections::HashMap;
use std::sync::Arc;

use nebula_datasource::{DataSource, DataSourceListener, Error, Result};

use crate::checks::{CanConnectCheck, ConnectivityCheck, HealthCheckConfig, WaitTimeCheck};
use crate::health::HealthCheckRegistry;

/// Registers three checks per data source when it starts and removes them
/// when it shuts down:
///
/// - `datasource.<name>.can_connect`
/// - `datasource.<name>.pool.connectivity`
/// - `datasource.<name>.pool.wait_p99`
///
/// Data sources without an explicit [`HealthCheckConfig`] use the default one.
pub struct HealthCheckListener {
    registry: Arc<HealthCheckRegistry>,
    defaults: HealthCheckConfig,
    overrides: HashMap<String, HealthCheckConfig>,
}

impl HealthCheckListener {
    pub fn new(registry: Arc<HealthCheckRegistry>) -> Self {
        Self {
            registry,
            defaults: HealthCheckConfig::default(),
            overrides: HashMap::new(),
        }
    }

    /// Use `config` for data sources without their own settings.
    pub fn with_defaults(mut self, config: HealthCheckConfig) -> Result<Self> {
        config.validate()?;
        self.defaults = config;
        Ok(self)
    }

    /// Use `config` for the data source `name`.
    pub fn with_config(mut self, name: impl Into<String>, config: HealthCheckConfig) -> Result<Self> {
        let name = name.into();
        config.validate().map_err(|e| match e {
            Error::Configuration { message, source } => Error::Configuration {
                message: format!("health checks for '{name}': {message}"),
                source,
            },
            other => other,
        })?;
        self.overrides.insert(name, config);
        Ok(self)
    }

    pub fn registry(&self) -> &Arc<HealthCheckRegistry> {
        &self.registry
    }

    fn config_for(&self, name: &str) -> &HealthCheckConfig {
        self.overrides.get(name).unwrap_or(&self.defaults)
    }

    /// Names of the checks registered for the data source `name`.
    #[must_use]
    pub fn check_names(name: &str) -> [String; 3] {
        [
            CanConnectCheck::check_name(name),
            ConnectivityCheck::check_name(name),
            WaitTimeCheck::check_name(name),
        ]
    }
}

impl DataSourceListener for HealthCheckListener {
    fn name(&self) -> &str {
        "health-checks"
    }

    fn after_startup(&self, name: &str, _url: &str, data_source: &Arc<dyn DataSource>) -> Result<()> {
        let config = self.config_for(name);
        self.registry.register(Arc::new(CanConnectCheck::new(
            name,
            Arc::clone(data_source),
            config.timeout,
        )));
        self.registry.register(Arc::new(ConnectivityCheck::new(
            name,
            Arc::clone(data_source),
            config.timeout,
            config.connectivity,
        )));
        self.registry.register(Arc::new(WaitTimeCheck::new(
            name,
            Arc::clone(data_source),
            config.wait_p99,
        )));
        tracing::debug!(data_source = name, "Registered health checks");
        Ok(())
    }

    fn after_shutdown(&self, name: &str, _url: &str, _data_source: &Arc<dyn DataSource>) -> Result<()> {
        for check in Self::check_names(name) {
            self.registry.remove(&check);
        }
        tracing::debug!(data_source = name, "Removed health checks");
        Ok(())
    }
}

impl std::fmt::Debug for HealthCheckListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckListener")
            .field("registry", &self.registry)
            .field("defaults", &self.defaults)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}
