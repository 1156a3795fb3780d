//! Integration tests for the instrumentation path
//!
//! Notifications go through an `Instrumentor`, fan out on the hook bus and
//! land in the store through the collector's adapters.

use super::common::fixtures::{event_names, CollectingSink, PanickingEventHook, ScriptedSession};
use std::sync::Arc;
use tuiscope::hooks::HookCategory;
use tuiscope::{CapturedValue, ComponentInfo, ComponentStatus, Instrumentor};

/// Test that a scripted session populates graph, logs and performance
#[test]
fn test_counter_app_is_recorded() {
    let session = ScriptedSession::counter_app();
    let store = session.store();

    let app = store.get_component("app").unwrap();
    assert_eq!(app.status, ComponentStatus::Updated);
    assert_eq!(app.children, vec!["btn"]);
    assert_eq!(app.state["count"], CapturedValue::Int(1));
    assert_eq!(app.find_ref("count").unwrap().value, CapturedValue::Int(1));
    assert_eq!(store.ref_owner("count").as_deref(), Some("app"));

    let btn = store.get_component("btn").unwrap();
    assert_eq!(btn.parent.as_ref().map(|p| p.id.as_str()), Some("app"));

    assert_eq!(event_names(store), vec!["click"]);
    assert_eq!(store.command_log().len(), 1);
    assert_eq!(store.component_performance("app").unwrap().render_count, 1);
}

/// Test that a child mounted before its parent is linked once the parent arrives
#[test]
fn test_child_before_parent_reconciles() {
    let session = ScriptedSession::new();
    session.mount("row", "Row", Some("table"));

    let store = session.store();
    assert_eq!(store.get_component_child_ids("table"), vec!["row"]);
    assert!(store.get_component("row").unwrap().parent.is_none());

    session.mount("table", "Table", None);
    assert_eq!(store.get_component("table").unwrap().children, vec!["row"]);
    assert_eq!(
        store.get_component("row").unwrap().parent.map(|p| p.name),
        Some("Table".to_string())
    );
    let roots: Vec<String> = store
        .get_root_components()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(roots, vec!["table"]);
}

/// Test that unmount marks the snapshot instead of deleting it
#[test]
fn test_unmount_keeps_snapshot() {
    let session = ScriptedSession::counter_app();
    session.instrumentor.component_unmounted("btn");

    let store = session.store();
    assert_eq!(
        store.get_component("btn").unwrap().status,
        ComponentStatus::Unmounted
    );
    assert_eq!(store.component_count(), 2);

    assert!(store.remove_component("btn"));
    assert!(store.get_component_child_ids("app").is_empty());
    assert!(store.get_component("app").unwrap().children.is_empty());
}

/// Test that a panicking hook is reported and does not stop delivery
#[test]
fn test_panicking_hook_is_isolated() {
    let session = ScriptedSession::new();
    let sink = Arc::new(CollectingSink::default());
    let bus = session.devtools.bus();
    bus.set_error_sink(Some(sink.clone()));
    bus.add_event_hook(Arc::new(PanickingEventHook));

    session.event("first", "x", 0);
    session.event("second", "x", 0);

    assert_eq!(event_names(session.store()), vec!["first", "second"]);
    let faults = sink.faults.lock();
    assert_eq!(faults.len(), 2);
    assert_eq!(faults[0].category, HookCategory::Event);
    assert_eq!(faults[0].notification, "event");
    assert!(faults[0].message.contains("first"));
}

/// Test that a disabled instrumentor records nothing and needs no collector
#[test]
fn test_disabled_instrumentor_is_inert() {
    let inst = Instrumentor::disabled();
    assert!(!inst.is_enabled());
    inst.component_mounted(&ComponentInfo::new("a", "A"));
    inst.ref_changed(None, "r", "r", 0, 1);
}

/// Test that ref changes for unknown owners are logged but touch no snapshot
#[test]
fn test_unowned_ref_change_only_hits_the_log() {
    let session = ScriptedSession::new();
    session.mount("app", "App", None);
    session
        .instrumentor
        .ref_changed(None, "orphan", "orphan", 0, 5);

    let store = session.store();
    assert_eq!(store.state_log().len(), 1);
    assert!(store.ref_owner("orphan").is_none());
    assert!(store.get_component("app").unwrap().state.is_empty());
}

/// Test that concurrent instrumentors share one ordered log per kind
#[test]
fn test_concurrent_instrumentors() {
    let session = ScriptedSession::new();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let inst = session.devtools.instrumentor();
            std::thread::spawn(move || {
                for i in 0..50 {
                    inst.event(&tuiscope::EventRecord::new(
                        format!("t{t}-{i}"),
                        "worker",
                        CapturedValue::Null,
                    ));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let seqs: Vec<u64> = session
        .store()
        .event_log()
        .get_all()
        .iter()
        .map(|e| e.seq_id)
        .collect();
    assert_eq!(seqs, (1..=200).collect::<Vec<u64>>());
}
