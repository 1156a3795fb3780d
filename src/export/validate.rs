//! Import validation. Every check runs before anything touches the store.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{DevtoolsError, Result};
use crate::export::checkpoint::{ExportCheckpoint, IncrementalExportData};
use crate::export::ExportData;
use crate::model::{CommandRecord, EventRecord, StateChange};

/// Problems listed in one error message beyond which the rest are counted.
const MAX_REPORTED: usize = 10;

/// `true` for the zero value of an export timestamp (the Unix epoch, which
/// is also what a missing timestamp field deserializes to).
pub fn is_unset(timestamp: &DateTime<Utc>) -> bool {
    *timestamp == DateTime::<Utc>::default()
}

#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn push(&mut self, problem: String) {
        self.0.push(problem);
    }

    fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let total = self.0.len();
        let mut message = self
            .0
            .into_iter()
            .take(MAX_REPORTED)
            .collect::<Vec<_>>()
            .join("; ");
        if total > MAX_REPORTED {
            message.push_str(&format!(" (and {} more)", total - MAX_REPORTED));
        }
        Err(DevtoolsError::Validation(message))
    }
}

pub fn validate_export(data: &ExportData) -> Result<()> {
    let mut problems = Problems::default();

    if data.version.trim().is_empty() {
        problems.push("version is missing".to_string());
    }
    if is_unset(&data.timestamp) {
        problems.push("timestamp is unset".to_string());
    }

    if let Some(components) = &data.components {
        let mut seen = HashSet::new();
        for (i, component) in components.iter().enumerate() {
            if component.id.is_empty() {
                problems.push(format!("components[{i}] has an empty id"));
            } else if !seen.insert(component.id.as_str()) {
                problems.push(format!(
                    "components[{i}] duplicates id '{}'",
                    component.id
                ));
            }
        }
    }

    if let Some(state) = &data.state {
        check_state(state, "state", &mut problems);
    }
    if let Some(events) = &data.events {
        check_events(events, "events", &mut problems);
    }
    if let Some(commands) = &data.commands {
        check_commands(commands, "commands", &mut problems);
    }

    problems.into_result()
}

pub fn validate_checkpoint(checkpoint: &ExportCheckpoint) -> Result<()> {
    if checkpoint.version.trim().is_empty() {
        return Err(DevtoolsError::InvalidCheckpoint(
            "version is missing".to_string(),
        ));
    }
    if is_unset(&checkpoint.timestamp) {
        return Err(DevtoolsError::InvalidCheckpoint(
            "timestamp is unset".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_delta(delta: &IncrementalExportData) -> Result<()> {
    validate_checkpoint(&delta.checkpoint)?;
    let mut problems = Problems::default();
    check_state(&delta.new_state, "new_state", &mut problems);
    check_events(&delta.new_events, "new_events", &mut problems);
    check_commands(&delta.new_commands, "new_commands", &mut problems);
    problems.into_result()
}

fn check_state(records: &[StateChange], section: &str, problems: &mut Problems) {
    for (i, change) in records.iter().enumerate() {
        if change.ref_id.is_empty() {
            problems.push(format!("{section}[{i}] has an empty ref_id"));
        }
        if is_unset(&change.timestamp) {
            problems.push(format!("{section}[{i}] has an unset timestamp"));
        }
    }
}

fn check_events(records: &[EventRecord], section: &str, problems: &mut Problems) {
    for (i, event) in records.iter().enumerate() {
        if event.id.is_empty() {
            problems.push(format!("{section}[{i}] has an empty id"));
        }
        if is_unset(&event.timestamp) {
            problems.push(format!("{section}[{i}] has an unset timestamp"));
        }
    }
}

fn check_commands(records: &[CommandRecord], section: &str, problems: &mut Problems) {
    for (i, command) in records.iter().enumerate() {
        if command.id.is_empty() {
            problems.push(format!("{section}[{i}] has an empty id"));
        }
        if is_unset(&command.generated) {
            problems.push(format!("{section}[{i}] has an unset timestamp"));
        }
    }
}
