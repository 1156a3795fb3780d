//! Integration tests for file-based export and import
//!
//! Covers gzip output and detection, redaction on the way out, and the
//! error paths for unreadable input.

use super::common::fixtures::{event_names, ScriptedSession};
use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tuiscope::export::codec::is_gzip;
use tuiscope::export::{read_envelope_from_path, Progress};
use tuiscope::{
    DevtoolsError, Envelope, ExportOptions, ImportOptions, Sanitizer, Store,
};

/// Test that a compressed export is gzip on disk and imports transparently
#[test]
fn test_gzip_export_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/session.json.gz");
    let session = ScriptedSession::counter_app();

    let options = ExportOptions::default().compressed(true);
    session.store().export_full_to_path(&path, &options).unwrap();
    assert!(is_gzip(&fs::read(&path).unwrap()));

    let dest = Store::default();
    let summary = dest.import_from_path(&path, &ImportOptions::default()).unwrap();
    assert_eq!(summary.components, 2);
    assert_eq!(summary.events, 1);
    assert_eq!(event_names(&dest), vec!["click"]);
}

/// Test that a sanitized export redacts the file but not the live store
#[test]
fn test_sanitized_export_leaves_store_raw() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("redacted.json");
    let session = ScriptedSession::counter_app();

    let sanitizer = Arc::new(Sanitizer::with_default_rules());
    let options = ExportOptions::default().with_sanitizer(sanitizer);
    session.store().export_full_to_path(&path, &options).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(!text.contains("hunter2"));
    assert!(text.contains("password=[REDACTED]"));

    let live = session.store().event_log().get_all();
    assert_eq!(live[0].payload.as_str(), Some("password=hunter2"));
}

/// Test that streaming redaction produces an importable file
#[test]
fn test_stream_sanitized_export_imports() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("streamed.json");
    let session = ScriptedSession::counter_app();

    let options = ExportOptions::default()
        .with_sanitizer(Arc::new(Sanitizer::with_default_rules()))
        .streaming(64 * 1024);
    session.store().export_full_to_path(&path, &options).unwrap();

    let Envelope::Full(data) = read_envelope_from_path(&path, &ImportOptions::default()).unwrap()
    else {
        panic!("expected a full export");
    };
    let events = data.events.unwrap();
    assert_eq!(events[0].payload.as_str(), Some("password=[REDACTED]"));
}

/// Test that a truncated gzip file fails with I/O context and changes nothing
#[test]
fn test_corrupt_gzip_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json.gz");
    let session = ScriptedSession::counter_app();
    session
        .store()
        .export_full_to_path(&path, &ExportOptions::default().compressed(true))
        .unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let dest = ScriptedSession::counter_app();
    let err = dest
        .store()
        .import_from_path(&path, &ImportOptions::default())
        .unwrap_err();
    assert!(matches!(err, DevtoolsError::Io { .. }), "{err}");
    assert_eq!(event_names(dest.store()), vec!["click"]);
}

/// Test that a missing file is an I/O error naming the path
#[test]
fn test_missing_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    let err = Store::default()
        .import_from_path(&path, &ImportOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}

/// Test that import reports progress once per section present in the file
#[test]
fn test_import_progress_per_section() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.json");
    let session = ScriptedSession::counter_app();
    let options = ExportOptions {
        include_components: false,
        include_performance: false,
        ..Default::default()
    };
    session.store().export_full_to_path(&path, &options).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let import = ImportOptions {
        progress: Some(Arc::new(move |p: &Progress| {
            sink.lock().push((p.section, p.items, p.sections_done));
        })),
        ..Default::default()
    };
    Store::default().import_from_path(&path, &import).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![("state", 1, 1), ("events", 1, 2), ("commands", 1, 3)]
    );
}
