//! Configuration bindings for named data sources.
//!
//! Reading the configuration source (file, env, ...) is the application's
//! job; these types are what it deserializes into. Each entry names a backing
//! `type` (resolved against registered [`SupplierProvider`]s), a `url`, and
//! any implementation-specific settings, which are kept as raw JSON until the
//! provider binds them to its own config type.
//!
//! [`SupplierProvider`]: crate::supplier::SupplierProvider

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration of a single named data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Backing implementation. May be omitted when exactly one provider is
    /// registered.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Connection URL.
    pub url: String,
    /// Implementation-specific settings (pool sizes, timeouts, ...).
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl DataSourceConfig {
    /// Create a config for `url` with no explicit type and no settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            kind: None,
            url: url.into(),
            settings: serde_json::Map::new(),
        }
    }

    /// Set the backing implementation type.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Add an implementation-specific setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Validate the parts of the config every implementation relies on.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::configuration("url cannot be empty"));
        }
        if self.kind.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(Error::configuration("type cannot be empty when present"));
        }
        Ok(())
    }

    /// Bind the implementation-specific settings to `T`.
    pub fn settings_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
            .map_err(|e| Error::configuration_with(format!("invalid settings: {e}"), e))
    }
}

/// All configured data sources, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourcesConfig {
    data_sources: BTreeMap<String, DataSourceConfig>,
}

impl DataSourcesConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserialize from a JSON value shaped as `{ "<name>": { "url": ... } }`.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::configuration_with(format!("invalid data source configuration: {e}"), e))
    }

    /// Add or replace the config for `name`.
    pub fn with(mut self, name: impl Into<String>, config: DataSourceConfig) -> Self {
        self.insert(name, config);
        self
    }

    /// Add or replace the config for `name`.
    pub fn insert(&mut self, name: impl Into<String>, config: DataSourceConfig) {
        self.data_sources.insert(name.into(), config);
    }

    /// Config for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&DataSourceConfig> {
        self.data_sources.get(name)
    }

    /// Iterate over `(name, config)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataSourceConfig)> {
        self.data_sources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of configured data sources.
    pub fn len(&self) -> usize {
        self.data_sources.len()
    }

    /// Whether nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.data_sources.is_empty()
    }

    /// Validate every entry, prefixing errors with the offending name.
    pub fn validate(&self) -> Result<()> {
        for (name, config) in &self.data_sources {
            if name.trim().is_empty() {
                return Err(Error::configuration("data source name cannot be empty"));
            }
            config.validate().map_err(|e| match e {
                Error::Configuration { message, source } => Error::Configuration {
                    message: format!("data source '{name}': {message}"),
                    source,
                },
                other => other,
            })?;
        }
        Ok(())
    }
}
