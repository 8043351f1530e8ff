//! Health checks and metrics attached through the factory's listeners.

use std::sync::Arc;
use std::time::Duration;

use nebula_datasource::{DataSourcesConfig, LazyDataSourceFactory};
use nebula_datasource_instrumented::{
    CanConnectCheck, ConnectivityCheck, HealthCheckConfig, HealthCheckListener,
    HealthCheckRegistry, HealthCheckStatus, MetricsListener, Thresholds, WaitTimeCheck,
    worst_status,
};
use nebula_datasource_pool::PoolProvider;
use nebula_datasource_pool::testing::MemoryNetwork;
use pretty_assertions::assert_eq;
use serde_json::json;

struct Harness {
    network: MemoryNetwork,
    registry: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricsListener>,
    factory: LazyDataSourceFactory,
}

fn harness(config: serde_json::Value, health: HealthCheckListener) -> Harness {
    let network = MemoryNetwork::new();
    let registry = Arc::clone(health.registry());
    let metrics = Arc::new(MetricsListener::new());

    let connector_network = network.clone();
    let factory = LazyDataSourceFactory::builder()
        .provider(Arc::new(PoolProvider::new(move |url: &str| {
            Ok(connector_network.manager(url))
        })))
        .listener(Arc::new(health))
        .listener(Arc::clone(&metrics) as Arc<dyn nebula_datasource::DataSourceListener>)
        .config(DataSourcesConfig::from_value(config).unwrap())
        .build()
        .unwrap();

    Harness {
        network,
        registry,
        metrics,
        factory,
    }
}

fn pool(url: &str) -> serde_json::Value {
    json!({ "url": url, "max_size": 2, "connection_timeout_ms": 200 })
}

fn assert_checks_for(registry: &HealthCheckRegistry, name: &str) {
    assert!(registry.contains(&CanConnectCheck::check_name(name)), "common check missing for {name}");
    assert!(registry.contains(&ConnectivityCheck::check_name(name)));
    assert!(registry.contains(&WaitTimeCheck::check_name(name)));
}

#[test]
fn configured_health_checks() {
    let registry = Arc::new(HealthCheckRegistry::new());
    let health = HealthCheckListener::new(Arc::clone(&registry))
        .with_config(
            "derby1",
            HealthCheckConfig {
                timeout: Duration::from_millis(200),
                connectivity: Thresholds::new(Duration::from_millis(100), Duration::from_millis(150)),
                ..Default::default()
            },
        )
        .unwrap();
    let h = harness(json!({ "derby1": pool("mem://derby1") }), health);

    h.factory.for_name("derby1").unwrap();

    let results = h.registry.run_all();
    assert_eq!(results.len(), 3);
    assert_checks_for(&h.registry, "derby1");
    assert_eq!(worst_status(results.values()), HealthCheckStatus::Ok);
}

#[test]
fn implicit_health_checks() {
    let h = harness(
        json!({ "DerbyDatabaseIT": pool("mem://it") }),
        HealthCheckListener::new(Arc::new(HealthCheckRegistry::new())),
    );

    h.factory.for_name("DerbyDatabaseIT").unwrap();

    assert_eq!(h.registry.run_all().len(), 3);
    assert_checks_for(&h.registry, "DerbyDatabaseIT");
}

#[test]
fn health_checks_for_multiple_data_sources() {
    let h = harness(
        json!({ "derby2": pool("mem://derby2"), "derby3": pool("mem://derby3") }),
        HealthCheckListener::new(Arc::new(HealthCheckRegistry::new())),
    );

    h.factory.for_name("derby2").unwrap();
    h.factory.for_name("derby3").unwrap();

    assert_checks_for(&h.registry, "derby2");
    assert_checks_for(&h.registry, "derby3");
    assert_eq!(h.registry.run_all().len(), 6);
    assert_eq!(
        h.metrics.live_names().into_iter().collect::<Vec<_>>(),
        vec!["derby2".to_string(), "derby3".to_string()]
    );
}

#[test]
fn nothing_is_registered_before_first_lookup() {
    let h = harness(
        json!({ "derby1": pool("mem://derby1") }),
        HealthCheckListener::new(Arc::new(HealthCheckRegistry::new())),
    );

    assert!(h.registry.is_empty());
    assert!(h.metrics.live_names().is_empty());
}

#[test]
fn shutdown_removes_checks_and_live_entries() {
    let h = harness(
        json!({ "derby1": pool("mem://derby1") }),
        HealthCheckListener::new(Arc::new(HealthCheckRegistry::new())),
    );
    h.factory.for_name("derby1").unwrap();
    h.metrics.report();

    h.factory.shutdown().unwrap();

    assert!(h.registry.is_empty());
    assert!(h.metrics.live_names().is_empty());
}

#[test]
fn unreachable_data_source_is_critical() {
    let h = harness(
        json!({ "derby1": pool("mem://derby1") }),
        HealthCheckListener::new(Arc::new(HealthCheckRegistry::new()))
            .with_defaults(HealthCheckConfig {
                timeout: Duration::from_millis(50),
                ..Default::default()
            })
            .unwrap(),
    );
    h.factory.for_name("derby1").unwrap();

    h.network.set_reachable(false);
    let results = h.registry.run_all();

    assert_eq!(
        results[&CanConnectCheck::check_name("derby1")].status,
        HealthCheckStatus::Critical
    );
    assert_eq!(
        results[&ConnectivityCheck::check_name("derby1")].status,
        HealthCheckStatus::Critical
    );
    assert_eq!(worst_status(results.values()), HealthCheckStatus::Critical);
}
