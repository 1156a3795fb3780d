//! Integration tests for the `tuiscope` binary

use super::common::fixtures::ScriptedSession;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tuiscope::export::{read_envelope_from_path, Envelope};
use tuiscope::{DevTools, DevtoolsConfig, ExportOptions, Store};

/// A command isolated from the developer's own config file.
fn tuiscope(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tuiscope").unwrap();
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

/// Write a full export of the counter app plus one delta with two events.
fn write_chain(dir: &Path) -> (PathBuf, PathBuf) {
    let session = ScriptedSession::counter_app();
    let full = dir.join("full.json");
    let delta = dir.join("delta.json");
    let options = ExportOptions::default();

    let checkpoint = session.store().export_full_to_path(&full, &options).unwrap();
    session.event("scroll", "list", 1);
    session.event("scroll", "list", 2);
    session
        .store()
        .export_incremental_to_path(&delta, Some(&checkpoint), &options)
        .unwrap();
    (full, delta)
}

/// Test that inspect summarises both envelope kinds
#[test]
fn test_inspect_full_and_delta() {
    let dir = TempDir::new().unwrap();
    let (full, delta) = write_chain(dir.path());

    tuiscope(dir.path())
        .arg("inspect")
        .arg(&full)
        .assert()
        .success()
        .stdout(predicate::str::contains("full export"))
        .stdout(predicate::str::contains("components   2"));

    tuiscope(dir.path())
        .arg("inspect")
        .arg(&delta)
        .assert()
        .success()
        .stdout(predicate::str::contains("incremental export"))
        .stdout(predicate::str::contains("events       2"));
}

/// Test that preview lists matches without writing anything
#[test]
fn test_preview_reports_paths() {
    let dir = TempDir::new().unwrap();
    let (full, _) = write_chain(dir.path());

    tuiscope(dir.path())
        .arg("preview")
        .arg(&full)
        .assert()
        .success()
        .stdout(predicate::str::contains("events[0].payload  [password]"))
        .stdout(predicate::str::contains("1 value(s) would be redacted"));
}

/// Test that sanitize writes a redacted copy in both modes
#[test]
fn test_sanitize_tree_and_stream() {
    let dir = TempDir::new().unwrap();
    let (full, _) = write_chain(dir.path());

    for (mode, out) in [(None, "tree.json"), (Some("--stream"), "stream.json")] {
        let output = dir.path().join(out);
        let mut cmd = tuiscope(dir.path());
        cmd.arg("sanitize").arg(&full).arg("-o").arg(&output);
        if let Some(flag) = mode {
            cmd.arg(flag);
        }
        cmd.assert()
            .success()
            .stdout(predicate::str::contains("redacted"));

        let text = fs::read_to_string(&output).unwrap();
        assert!(!text.contains("hunter2"), "{out} still holds the secret");
    }
}

/// Test that extra rules from a config file are applied
#[test]
fn test_sanitize_with_config_rules() {
    let dir = TempDir::new().unwrap();
    let (full, _) = write_chain(dir.path());
    let config = dir.path().join("tuiscope.toml");
    fs::write(
        &config,
        "[sanitize]\ndefault_rules = false\n\n[[sanitize.rules]]\nname = \"clicks\"\npattern = \"hunter2\"\nreplacement = \"***\"\n",
    )
    .unwrap();
    let output = dir.path().join("out.json");

    tuiscope(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("sanitize")
        .arg(&full)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("clicks"));

    assert!(fs::read_to_string(&output).unwrap().contains("password=***"));
}

/// Test that merge replays a chain into one full export
#[test]
fn test_merge_consolidates_chain() {
    let dir = TempDir::new().unwrap();
    let (full, delta) = write_chain(dir.path());
    let merged = dir.path().join("merged.json.gz");

    tuiscope(dir.path())
        .arg("merge")
        .arg(&full)
        .arg(&delta)
        .arg("-o")
        .arg(&merged)
        .arg("--compress")
        .assert()
        .success()
        .stdout(predicate::str::contains("merged 1 delta(s)"));

    let store = Store::default();
    store
        .import_from_path(&merged, &Default::default())
        .unwrap();
    assert_eq!(store.event_log().len(), 3);
    assert_eq!(store.component_count(), 2);
}

/// Test that merge keeps the source's checkpoint when the chain had evictions
#[test]
fn test_merge_keeps_source_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = DevtoolsConfig {
        event_capacity: 1,
        ..Default::default()
    };
    let session = ScriptedSession::with_devtools(DevTools::new(config).unwrap());
    session.event("click", "btn", "x");
    let full = dir.path().join("full.json");
    let delta = dir.path().join("delta.json");
    let options = ExportOptions::default();
    let checkpoint = session.store().export_full_to_path(&full, &options).unwrap();
    // The first scroll is evicted before the delta is taken.
    session.event("scroll", "list", 1);
    session.event("scroll", "list", 2);
    let marks = session
        .store()
        .export_incremental_to_path(&delta, Some(&checkpoint), &options)
        .unwrap();
    assert_eq!(marks.last_event_id, 3);

    let merged = dir.path().join("merged.json");
    tuiscope(dir.path())
        .arg("merge")
        .arg(&full)
        .arg(&delta)
        .arg("-o")
        .arg(&merged)
        .assert()
        .success()
        .stdout(predicate::str::contains("events=3"));

    let Envelope::Full(data) = read_envelope_from_path(&merged, &Default::default()).unwrap()
    else {
        panic!("merge should write a full export");
    };
    assert_eq!(data.events.map(|e| e.len()), Some(2));
    assert_eq!(data.checkpoint, Some(marks));
}

/// Test that merge refuses a delta in the full-export position
#[test]
fn test_merge_rejects_swapped_inputs() {
    let dir = TempDir::new().unwrap();
    let (full, delta) = write_chain(dir.path());

    tuiscope(dir.path())
        .arg("merge")
        .arg(&delta)
        .arg(&full)
        .arg("-o")
        .arg(dir.path().join("never.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a full export"));
}

/// Test that unreadable input fails with context
#[test]
fn test_inspect_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    tuiscope(dir.path())
        .arg("inspect")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}
