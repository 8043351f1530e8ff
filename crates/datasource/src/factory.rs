//! Lazy data source factory: named lookup, single-flight startup, shutdown.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::{DataSourceConfig, DataSourcesConfig};
use crate::data_source::{DataSource, ManagedDataSource};
use crate::error::{Error, Result};
use crate::listener::DataSourceListener;
use crate::supplier::{DataSourceSupplier, SupplierProvider};

/// Per-name cache cell. The mutex serializes startup of one name without
/// blocking lookups of any other name.
type Slot = Mutex<Option<Arc<ManagedDataSource>>>;

// ---------------------------------------------------------------------------
// LazyDataSourceFactory
// ---------------------------------------------------------------------------

/// Registry of named data sources, each started on first lookup.
///
/// The supplier map and listener list are fixed at construction. Started data
/// sources are cached until [`shutdown`](Self::shutdown), after which the
/// factory is closed and every lookup fails with [`Error::Closed`].
///
/// Share it as `Arc<LazyDataSourceFactory>`; it is not a global.
pub struct LazyDataSourceFactory {
    suppliers: HashMap<String, Arc<dyn DataSourceSupplier>>,
    listeners: Vec<Arc<dyn DataSourceListener>>,
    data_sources: DashMap<String, Arc<Slot>>,
    closed: AtomicBool,
}

impl LazyDataSourceFactory {
    /// Create a factory over a fixed set of suppliers and listeners.
    pub fn new(
        suppliers: HashMap<String, Arc<dyn DataSourceSupplier>>,
        listeners: Vec<Arc<dyn DataSourceListener>>,
    ) -> Self {
        Self {
            suppliers,
            listeners,
            data_sources: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Start building a factory from configuration.
    #[must_use]
    pub fn builder() -> DataSourceFactoryBuilder {
        DataSourceFactoryBuilder::new()
    }

    /// Look up the data source `name`, starting it if this is the first request.
    ///
    /// Concurrent callers asking for the same not-yet-started name block until
    /// the single startup finishes and all receive the same handle. A failed
    /// startup is not cached; the next call tries again.
    pub fn for_name(&self, name: &str) -> Result<Arc<dyn DataSource>> {
        if let Some(data_source) = self.cached(name) {
            tracing::debug!(data_source = name, "Data source cache hit");
            return Ok(data_source);
        }

        if name.is_empty() {
            return Err(Error::configuration("data source name cannot be empty"));
        }

        // Unknown names must never reach the cache.
        let supplier = self.suppliers.get(name).ok_or_else(|| {
            Error::configuration(format!(
                "no configuration present for data source named '{name}'"
            ))
        })?;

        let slot = {
            let entry = self.data_sources.entry(name.to_owned());
            // Checked under the shard lock so `shutdown` either sees this slot
            // or this call sees the closed flag.
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::closed(name));
            }
            Arc::clone(entry.or_default().value())
        };

        let mut cell = slot.lock();
        if let Some(managed) = cell.as_ref() {
            tracing::debug!(data_source = name, "Data source already started by a concurrent lookup");
            return Ok(Arc::clone(managed.data_source()));
        }
        // `shutdown` may have drained this slot between the check above and
        // taking the lock.
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed(name));
        }

        let managed = self.start(name, supplier.as_ref())?;
        let data_source = Arc::clone(managed.data_source());
        *cell = Some(Arc::new(managed));
        Ok(data_source)
    }

    /// Names of every configured data source, started or not.
    pub fn all_names(&self) -> BTreeSet<String> {
        self.suppliers.keys().cloned().collect()
    }

    /// Whether `name` has been started and not yet shut down.
    pub fn is_started(&self, name: &str) -> bool {
        self.data_sources
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .is_some_and(|slot| slot.lock().is_some())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut down every started data source and notify listeners.
    ///
    /// Each data source is shut down before its `after_shutdown`
    /// notifications run. Shut-down data sources leave the cache, so a second
    /// call does nothing. All data sources are processed even if some fail;
    /// the first error is returned.
    pub fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        // Clone the slots out so no shard lock is held while shutting down.
        let slots: Vec<(String, Arc<Slot>)> = self
            .data_sources
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut first_error = None;
        for (name, slot) in slots {
            // Waits for an in-flight startup of this name to finish.
            let Some(managed) = slot.lock().take() else {
                continue;
            };

            if let Err(err) = managed.shutdown() {
                tracing::warn!(data_source = %name, error = %err, "Data source shutdown failed");
                first_error.get_or_insert(err);
            } else {
                tracing::info!(data_source = %name, "Data source shut down");
            }

            for listener in &self.listeners {
                if let Err(err) =
                    listener.after_shutdown(&name, managed.url(), managed.data_source())
                {
                    tracing::warn!(
                        data_source = %name,
                        listener = listener.name(),
                        error = %err,
                        "Shutdown listener failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Return the cached handle for `name` without starting anything.
    fn cached(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        let slot = self
            .data_sources
            .get(name)
            .map(|entry| Arc::clone(entry.value()))?;
        let cell = slot.lock();
        cell.as_ref().map(|managed| Arc::clone(managed.data_source()))
    }

    /// Run the startup sequence for `name`. Caller holds the name's slot lock.
    fn start(&self, name: &str, supplier: &dyn DataSourceSupplier) -> Result<ManagedDataSource> {
        let url = supplier.url();

        for listener in &self.listeners {
            listener.before_startup(name, url)?;
        }

        let managed = supplier.start().inspect_err(|err| {
            tracing::warn!(data_source = name, url, error = %err, "Data source failed to start");
        })?;

        for (index, listener) in self.listeners.iter().enumerate() {
            if let Err(err) = listener.after_startup(name, url, managed.data_source()) {
                // The handle is never published, so stop it here and let the
                // listeners that already saw it forget it.
                if let Err(shutdown_err) = managed.shutdown() {
                    tracing::warn!(
                        data_source = name,
                        error = %shutdown_err,
                        "Failed to stop data source after listener error"
                    );
                }
                for notified in &self.listeners[..index] {
                    if let Err(undo_err) = notified.after_shutdown(name, url, managed.data_source()) {
                        tracing::warn!(
                            data_source = name,
                            listener = notified.name(),
                            error = %undo_err,
                            "Shutdown listener failed"
                        );
                    }
                }
                return Err(err);
            }
        }

        tracing::info!(data_source = name, url, kind = managed.data_source().kind(), "Data source started");
        Ok(managed)
    }
}

impl std::fmt::Debug for LazyDataSourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyDataSourceFactory")
            .field("configured", &self.suppliers.len())
            .field("listener_count", &self.listeners.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DataSourceFactoryBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`LazyDataSourceFactory`] from explicit suppliers,
/// configuration resolved through [`SupplierProvider`]s, and listeners.
#[derive(Default)]
pub struct DataSourceFactoryBuilder {
    suppliers: HashMap<String, Arc<dyn DataSourceSupplier>>,
    providers: Vec<Arc<dyn SupplierProvider>>,
    listeners: Vec<Arc<dyn DataSourceListener>>,
    config: DataSourcesConfig,
}

impl DataSourceFactoryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready-made supplier under `name`.
    pub fn supplier(mut self, name: impl Into<String>, supplier: Arc<dyn DataSourceSupplier>) -> Self {
        self.suppliers.insert(name.into(), supplier);
        self
    }

    /// Register a provider for one backing `type`.
    pub fn provider(mut self, provider: Arc<dyn SupplierProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Register a lifecycle listener. Listeners run in registration order.
    pub fn listener(mut self, listener: Arc<dyn DataSourceListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Use `config` for the configuration-driven data sources.
    pub fn config(mut self, config: DataSourcesConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve every configured data source to a supplier and build the factory.
    ///
    /// Fails if the config is invalid, if a `type` has no provider, or if a
    /// name is both configured and registered as an explicit supplier.
    pub fn build(self) -> Result<LazyDataSourceFactory> {
        let Self {
            mut suppliers,
            providers,
            listeners,
            config,
        } = self;
        config.validate()?;

        for (name, entry) in config.iter() {
            if suppliers.contains_key(name) {
                return Err(Error::configuration(format!(
                    "data source '{name}' is configured more than once"
                )));
            }
            let provider = Self::resolve_provider(&providers, name, entry)?;
            let supplier = provider.create_supplier(name, entry)?;
            tracing::debug!(data_source = name, kind = provider.kind(), "Registered data source");
            suppliers.insert(name.to_owned(), supplier);
        }

        Ok(LazyDataSourceFactory::new(suppliers, listeners))
    }

    fn resolve_provider<'a>(
        providers: &'a [Arc<dyn SupplierProvider>],
        name: &str,
        config: &DataSourceConfig,
    ) -> Result<&'a Arc<dyn SupplierProvider>> {
        if let Some(kind) = config.kind.as_deref() {
            return providers
                .iter()
                .find(|p| p.kind() == kind)
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "data source '{name}': no provider registered for type '{kind}'"
                    ))
                });
        }

        match providers {
            [only] => Ok(only),
            [] => Err(Error::configuration(format!(
                "data source '{name}': no data source providers registered"
            ))),
            many => {
                let kinds: Vec<&str> = many.iter().map(|p| p.kind()).collect();
                Err(Error::configuration(format!(
                    "data source '{name}': 'type' is required when several providers are registered ({})",
                    kinds.join(", ")
                )))
            }
        }
    }
}

impl std::fmt::Debug for DataSourceFactoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceFactoryBuilder")
            .field("supplier_count", &self.suppliers.len())
            .field("provider_count", &self.providers.len())
            .field("listener_count", &self.listeners.len())
            .field("configured", &self.config.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
