//! Integration tests for the checkpoint / incremental export chain
//!
//! A full export followed by any number of deltas, replayed in order onto a
//! fresh store, must reproduce the source logs.

use super::common::fixtures::{event_names, unsequenced, ScriptedSession};
use std::io::Cursor;
use tuiscope::{ExportCheckpoint, ExportOptions, ImportOptions, IncrementalExportData, Store};

/// Append `count` records spread over the three logs.
fn append_batch(session: &ScriptedSession, start: usize, count: usize) {
    for i in start..start + count {
        match i % 3 {
            0 => session.event(&format!("event-{i}"), "list", i as i64),
            1 => session.set_ref("app", "count", i as i64 - 1, i as i64),
            _ => session.command(&format!("command-{i}"), "app"),
        }
    }
}

/// Run one full export and one delta per batch, returning every payload.
fn export_chain(session: &ScriptedSession, batches: &[usize]) -> (Vec<u8>, Vec<Vec<u8>>) {
    let store = session.store();
    let options = ExportOptions::default();

    let mut appended = 0;
    append_batch(session, appended, batches[0]);
    appended += batches[0];

    let mut full = Vec::new();
    let mut checkpoint = store.export_full(&mut full, &options).unwrap();

    let mut deltas = Vec::new();
    for &batch in &batches[1..] {
        append_batch(session, appended, batch);
        appended += batch;
        let mut delta = Vec::new();
        checkpoint = store
            .export_incremental(&mut delta, Some(&checkpoint), &options)
            .unwrap();
        deltas.push(delta);
    }
    (full, deltas)
}

fn replay(full: Vec<u8>, deltas: Vec<Vec<u8>>) -> Store {
    let dest = Store::default();
    let options = ImportOptions::default();
    dest.import(Cursor::new(full), &options).unwrap();
    for delta in deltas {
        dest.import_delta(Cursor::new(delta), &options).unwrap();
    }
    dest
}

fn assert_logs_match(source: &Store, dest: &Store) {
    assert_eq!(
        unsequenced(dest.event_log().get_all()),
        unsequenced(source.event_log().get_all())
    );
    assert_eq!(
        unsequenced(dest.state_log().get_all()),
        unsequenced(source.state_log().get_all())
    );
    assert_eq!(
        unsequenced(dest.command_log().get_all()),
        unsequenced(source.command_log().get_all())
    );
}

/// Test that a chain of deltas rebuilds the source for several split shapes
#[test]
fn test_chain_round_trip_reconstructs_logs() {
    let shapes: &[&[usize]] = &[
        &[10],
        &[0, 10],
        &[5, 5, 5],
        &[1, 0, 7, 0, 2],
        &[30, 1, 1, 1, 40],
    ];

    for batches in shapes {
        let session = ScriptedSession::counter_app();
        let (full, deltas) = export_chain(&session, batches);
        let dest = replay(full, deltas);
        assert_logs_match(session.store(), &dest);
    }
}

/// Test that replay onto a fresh store also reproduces sequence numbers
#[test]
fn test_fresh_replay_matches_sequence_numbers() {
    let session = ScriptedSession::new();
    session.mount("app", "App", None);
    let (full, deltas) = export_chain(&session, &[4, 4, 4]);
    let dest = replay(full, deltas);

    assert_eq!(dest.event_log().get_all(), session.store().event_log().get_all());
    assert_eq!(dest.state_log().max_id(), session.store().state_log().max_id());
}

/// Test the two-events-after-full-export scenario
#[test]
fn test_delta_carries_exactly_the_new_events() {
    let session = ScriptedSession::counter_app();
    let store = session.store();
    let options = ExportOptions::default();

    let checkpoint = store.export_full(Vec::new(), &options).unwrap();
    session.event("scroll", "list", 1);
    session.event("scroll", "list", 2);

    let mut buf = Vec::new();
    let next = store
        .export_incremental(&mut buf, Some(&checkpoint), &options)
        .unwrap();

    let delta: IncrementalExportData = serde_json::from_slice(&buf).unwrap();
    assert_eq!(delta.new_events.len(), 2);
    assert!(delta.new_state.is_empty());
    assert!(delta.new_commands.is_empty());
    assert_eq!(next.last_event_id, checkpoint.last_event_id + 2);
    assert_eq!(next.last_state_id, checkpoint.last_state_id);
    assert_eq!(delta.checkpoint, next);
}

/// Test that clearing the source between deltas loses nothing after the clear
#[test]
fn test_clear_between_deltas_keeps_marks_valid() {
    let session = ScriptedSession::new();
    let store = session.store();
    session.event("before", "x", 0);

    let checkpoint = store.get_since(&ExportCheckpoint::origin()).checkpoint;
    store.clear();
    session.event("after", "x", 0);

    let delta = store.get_since(&checkpoint);
    let names: Vec<&str> = delta.new_events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["after"]);
    assert_eq!(delta.checkpoint.last_event_id, 2);
}

/// Test that importing a delta onto a live store only appends
#[test]
fn test_delta_import_appends_to_existing_history() {
    let source = ScriptedSession::new();
    source.event("remote-1", "x", 0);
    source.event("remote-2", "x", 0);
    let mut buf = Vec::new();
    source
        .store()
        .export_incremental(&mut buf, Some(&ExportCheckpoint::origin()), &ExportOptions::default())
        .unwrap();

    let dest = ScriptedSession::counter_app();
    dest.store()
        .import_delta(Cursor::new(buf), &ImportOptions::default())
        .unwrap();

    assert_eq!(
        event_names(dest.store()),
        vec!["click", "remote-1", "remote-2"]
    );
    assert_eq!(dest.store().component_count(), 2);
}
