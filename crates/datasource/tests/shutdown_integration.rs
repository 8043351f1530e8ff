//! Shutdown: pairing of shutdown and notification, repeat calls, races with
//! lookups.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nebula_datasource::testing::{ListenerEvent, Phase, RecordingListener, StubDataSource, StubSupplier};
use nebula_datasource::{
    DataSource, DataSourceListener, DataSourceSupplier, Error, LazyDataSourceFactory, Result,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn suppliers(entries: &[(&str, &Arc<StubSupplier>)]) -> HashMap<String, Arc<dyn DataSourceSupplier>> {
    entries
        .iter()
        .map(|(n, s)| ((*n).to_owned(), Arc::clone(s) as Arc<dyn DataSourceSupplier>))
        .collect()
}

/// Records how many shutdowns the handle had seen when `after_shutdown` ran.
#[derive(Default)]
struct ShutdownOrderProbe {
    observed: Mutex<Vec<(String, u32)>>,
}

impl DataSourceListener for ShutdownOrderProbe {
    fn name(&self) -> &str {
        "probe"
    }

    fn after_shutdown(&self, name: &str, _url: &str, data_source: &Arc<dyn DataSource>) -> Result<()> {
        let stub = data_source
            .as_any()
            .downcast_ref::<StubDataSource>()
            .expect("stub handle");
        self.observed.lock().push((name.to_owned(), stub.shutdowns()));
        Ok(())
    }
}

#[test]
fn shutdown_pairs_each_started_data_source_with_notification() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let s2 = Arc::new(StubSupplier::new("mem://db2"));
    let s3 = Arc::new(StubSupplier::new("mem://db3"));
    let probe = Arc::new(ShutdownOrderProbe::default());
    let recorder = Arc::new(RecordingListener::new("rec"));
    let factory = LazyDataSourceFactory::new(
        suppliers(&[("db1", &s1), ("db2", &s2), ("db3", &s3)]),
        vec![
            Arc::clone(&probe) as Arc<dyn DataSourceListener>,
            Arc::clone(&recorder) as Arc<dyn DataSourceListener>,
        ],
    );

    factory.for_name("db1").unwrap();
    factory.for_name("db2").unwrap();

    factory.shutdown().unwrap();

    // Never-started data sources are neither started nor shut down
    assert_eq!(s3.starts(), 0);
    assert_eq!(s1.started()[0].shutdowns(), 1);
    assert_eq!(s2.started()[0].shutdowns(), 1);

    // Shutdown happened before the notification for the same name
    let mut observed = probe.observed.lock().clone();
    observed.sort();
    assert_eq!(observed, vec![("db1".to_owned(), 1), ("db2".to_owned(), 1)]);

    let mut notified: Vec<ListenerEvent> = recorder.events_for(Phase::AfterShutdown);
    notified.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        notified,
        vec![
            ListenerEvent::after_shutdown("db1", "mem://db1"),
            ListenerEvent::after_shutdown("db2", "mem://db2"),
        ]
    );

    // all_names is unaffected
    assert_eq!(
        factory.all_names(),
        BTreeSet::from(["db1".to_owned(), "db2".to_owned(), "db3".to_owned()])
    );
}

#[test]
fn second_shutdown_does_not_repeat_work() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let recorder = Arc::new(RecordingListener::new("rec"));
    let factory = LazyDataSourceFactory::new(
        suppliers(&[("db1", &s1)]),
        vec![Arc::clone(&recorder) as Arc<dyn DataSourceListener>],
    );
    factory.for_name("db1").unwrap();

    factory.shutdown().unwrap();
    factory.shutdown().unwrap();

    assert_eq!(s1.started()[0].shutdowns(), 1);
    assert_eq!(recorder.events_for(Phase::AfterShutdown).len(), 1);
}

#[test]
fn lookup_after_shutdown_is_closed() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let s2 = Arc::new(StubSupplier::new("mem://db2"));
    let factory = LazyDataSourceFactory::new(suppliers(&[("db1", &s1), ("db2", &s2)]), Vec::new());
    factory.for_name("db1").unwrap();
    factory.shutdown().unwrap();

    assert!(matches!(factory.for_name("db1"), Err(Error::Closed { .. })));
    assert!(matches!(factory.for_name("db2"), Err(Error::Closed { .. })));
    assert_eq!(s2.starts(), 0);
    // Unknown names are still configuration errors
    assert!(matches!(factory.for_name("db9"), Err(Error::Configuration { .. })));
}

#[test]
fn failing_shutdown_listener_does_not_stop_other_data_sources() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let s2 = Arc::new(StubSupplier::new("mem://db2"));
    let failing = Arc::new(RecordingListener::new("failing").fail_after_shutdown());
    let factory = LazyDataSourceFactory::new(
        suppliers(&[("db1", &s1), ("db2", &s2)]),
        vec![Arc::clone(&failing) as Arc<dyn DataSourceListener>],
    );
    factory.for_name("db1").unwrap();
    factory.for_name("db2").unwrap();

    let err = factory.shutdown().unwrap_err();
    assert!(matches!(err, Error::Listener { .. }));

    assert_eq!(s1.started()[0].shutdowns(), 1);
    assert_eq!(s2.started()[0].shutdowns(), 1);
    assert_eq!(failing.events_for(Phase::AfterShutdown).len(), 2);
}

#[test]
fn shutdown_waits_for_in_flight_startup() {
    let slow = Arc::new(StubSupplier::new("mem://slow").with_delay(Duration::from_millis(150)));
    let factory = Arc::new(LazyDataSourceFactory::new(suppliers(&[("slow", &slow)]), Vec::new()));

    let starter = {
        let factory = Arc::clone(&factory);
        thread::spawn(move || factory.for_name("slow"))
    };

    // Let the startup begin, then shut down while it is still running.
    thread::sleep(Duration::from_millis(50));
    factory.shutdown().unwrap();

    let result = starter.join().unwrap();
    match result {
        // Startup won the race: shutdown must have stopped it.
        Ok(_) => assert_eq!(slow.started()[0].shutdowns(), 1),
        // Shutdown won: nothing was started.
        Err(err) => {
            assert!(matches!(err, Error::Closed { .. }));
            assert_eq!(slow.starts(), 0);
        }
    }
    assert!(!factory.is_started("slow"));
}
