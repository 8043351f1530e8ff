//! Listener notification order and failure propagation.

use std::collections::HashMap;
use std::sync::Arc;

use nebula_datasource::testing::{ListenerEvent, Phase, RecordingListener, StubSupplier};
use nebula_datasource::{
    DataSourceListener, DataSourceSupplier, Error, LazyDataSourceFactory,
};
use pretty_assertions::assert_eq;

fn factory(
    suppliers: &[(&str, &Arc<StubSupplier>)],
    listeners: &[&Arc<RecordingListener>],
) -> LazyDataSourceFactory {
    LazyDataSourceFactory::new(
        suppliers
            .iter()
            .map(|(n, s)| ((*n).to_owned(), Arc::clone(s) as Arc<dyn DataSourceSupplier>))
            .collect::<HashMap<_, _>>(),
        listeners
            .iter()
            .map(|l| Arc::clone(l) as Arc<dyn DataSourceListener>)
            .collect(),
    )
}

#[test]
fn every_listener_sees_one_before_after_pair() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let l1 = Arc::new(RecordingListener::new("l1"));
    let l2 = Arc::new(RecordingListener::new("l2"));
    let factory = factory(&[("db1", &s1)], &[&l1, &l2]);

    let handle = factory.for_name("db1").unwrap();
    factory.for_name("db1").unwrap();

    let expected = vec![
        ListenerEvent::before_startup("db1", "mem://db1"),
        ListenerEvent::after_startup("db1", "mem://db1"),
    ];
    assert_eq!(l1.events(), expected);
    assert_eq!(l2.events(), expected);

    // after_startup received the very handle returned to the caller
    let (name, seen) = l1.started_handles().pop().unwrap();
    assert_eq!(name, "db1");
    assert!(Arc::ptr_eq(&seen, &handle));
}

#[test]
fn failing_before_startup_aborts_without_starting() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let ok = Arc::new(RecordingListener::new("ok"));
    let veto = Arc::new(RecordingListener::new("veto").fail_before_startup());
    let factory = factory(&[("db1", &s1)], &[&ok, &veto]);

    let err = factory.for_name("db1").unwrap_err();
    assert!(matches!(&err, Error::Listener { listener, .. } if listener == "veto"));
    assert_eq!(s1.starts(), 0);
    assert!(!factory.is_started("db1"));

    // The first listener was notified, the aborted startup never completed
    assert_eq!(ok.events_for(Phase::BeforeStartup).len(), 1);
    assert!(ok.events_for(Phase::AfterStartup).is_empty());
}

#[test]
fn construction_failure_reaches_caller_unmodified() {
    let s1 = Arc::new(StubSupplier::new("mem://db1").fail_times(1));
    let l1 = Arc::new(RecordingListener::new("l1"));
    let factory = factory(&[("db1", &s1)], &[&l1]);

    let err = factory.for_name("db1").unwrap_err();
    match err {
        Error::Construction {
            data_source,
            reason,
            ..
        } => {
            assert_eq!(data_source, "db1");
            assert_eq!(reason, "stub start #1 failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(l1.events_for(Phase::AfterStartup).is_empty());

    // Retried from scratch on the next lookup, listeners notified again
    factory.for_name("db1").unwrap();
    assert_eq!(l1.events_for(Phase::BeforeStartup).len(), 2);
    assert_eq!(l1.events_for(Phase::AfterStartup).len(), 1);
}

#[test]
fn unconfigured_name_triggers_no_notifications() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let l1 = Arc::new(RecordingListener::new("l1"));
    let factory = factory(&[("db1", &s1)], &[&l1]);

    assert!(matches!(factory.for_name("db3"), Err(Error::Configuration { .. })));
    assert!(l1.events().is_empty());
}

#[test]
fn separate_names_notify_separately() {
    let s1 = Arc::new(StubSupplier::new("mem://db1"));
    let s2 = Arc::new(StubSupplier::new("mem://db2"));
    let l1 = Arc::new(RecordingListener::new("l1"));
    let factory = factory(&[("db1", &s1), ("db2", &s2)], &[&l1]);

    let a = factory.for_name("db1").unwrap();
    let b = factory.for_name("db2").unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(
        l1.events(),
        vec![
            ListenerEvent::before_startup("db1", "mem://db1"),
            ListenerEvent::after_startup("db1", "mem://db1"),
            ListenerEvent::before_startup("db2", "mem://db2"),
            ListenerEvent::after_startup("db2", "mem://db2"),
        ]
    );
}
