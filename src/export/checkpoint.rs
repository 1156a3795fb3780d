//! High-water marks and delta envelopes.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DevtoolsError, Result};
use crate::export::validate::{validate_checkpoint, validate_delta};
use crate::export::{
    create_file, decode_delta, decode_raw, report, write_envelope, ExportOptions, ImportOptions,
    ImportSummary, EXPORT_VERSION,
};
use crate::model::{CommandRecord, EventRecord, StateChange};
use crate::sanitize::{join_field, redact_fields, Redact};
use crate::store::log::Sequenced;
use crate::store::Store;

/// One mark per sequence log: the highest number the export has covered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportCheckpoint {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub last_event_id: u64,
    #[serde(default)]
    pub last_state_id: u64,
    #[serde(default)]
    pub last_command_id: u64,
}

impl ExportCheckpoint {
    /// A checkpoint before anything was recorded. Deltas against it carry
    /// every retained entry.
    pub fn origin() -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            timestamp: Utc::now(),
            last_event_id: 0,
            last_state_id: 0,
            last_command_id: 0,
        }
    }
}

/// Entries appended after a checkpoint, plus the checkpoint that covers them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncrementalExportData {
    pub checkpoint: ExportCheckpoint,
    #[serde(default)]
    pub new_events: Vec<EventRecord>,
    #[serde(default)]
    pub new_state: Vec<StateChange>,
    #[serde(default)]
    pub new_commands: Vec<CommandRecord>,
}

impl IncrementalExportData {
    pub fn is_empty(&self) -> bool {
        self.new_events.is_empty() && self.new_state.is_empty() && self.new_commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new_events.len() + self.new_state.len() + self.new_commands.len()
    }
}

redact_fields!(IncrementalExportData; new_events, new_state, new_commands);

/// Entries newer than `mark` and the advanced mark.
fn collect_since<T: Sequenced + Clone>(
    log: &crate::store::log::SequenceLog<T>,
    mark: u64,
    log_name: &'static str,
) -> (Vec<T>, u64) {
    let (entries, counter) = log.since_with_max(mark);
    if let Some(first) = entries.first() {
        if first.sequence() > mark + 1 {
            tracing::warn!(
                log = log_name,
                mark,
                first = first.sequence(),
                lost = first.sequence() - mark - 1,
                "entries evicted before incremental export"
            );
        }
    }
    (entries, mark.max(counter))
}

impl Store {
    /// Filter every log to entries strictly newer than `checkpoint`.
    ///
    /// The returned marks never move backwards, even when `checkpoint` came
    /// from a store whose counters ran further than this one.
    pub fn get_since(&self, checkpoint: &ExportCheckpoint) -> IncrementalExportData {
        let (new_events, last_event_id) =
            collect_since(self.event_log(), checkpoint.last_event_id, "events");
        let (new_state, last_state_id) =
            collect_since(self.state_log(), checkpoint.last_state_id, "state");
        let (new_commands, last_command_id) =
            collect_since(self.command_log(), checkpoint.last_command_id, "commands");

        IncrementalExportData {
            checkpoint: ExportCheckpoint {
                version: EXPORT_VERSION.to_string(),
                timestamp: Utc::now(),
                last_event_id,
                last_state_id,
                last_command_id,
            },
            new_events,
            new_state,
            new_commands,
        }
    }

    /// Write the delta since `checkpoint` and return the next checkpoint.
    ///
    /// A delta always covers all three logs; the section flags of `options`
    /// apply to full exports only.
    pub fn export_incremental<W: Write>(
        &self,
        mut dest: W,
        checkpoint: Option<&ExportCheckpoint>,
        options: &ExportOptions,
    ) -> Result<ExportCheckpoint> {
        let checkpoint = checkpoint.ok_or_else(|| {
            DevtoolsError::InvalidCheckpoint("incremental export needs a checkpoint".to_string())
        })?;
        validate_checkpoint(checkpoint)?;
        options.codecs.get(&options.format)?;

        let mut delta = self.get_since(checkpoint);
        report(&options.progress, "events", delta.new_events.len(), 1, 3);
        report(&options.progress, "state", delta.new_state.len(), 2, 3);
        report(&options.progress, "commands", delta.new_commands.len(), 3, 3);

        if let Some(sanitizer) = options.tree_sanitizer() {
            delta = sanitizer.sanitize(&delta);
        }
        write_envelope(&delta, &mut dest, options)?;
        dest.flush()
            .map_err(|e| DevtoolsError::io("flushing incremental export", e))?;

        tracing::debug!(
            events = delta.new_events.len(),
            state = delta.new_state.len(),
            commands = delta.new_commands.len(),
            "incremental export written"
        );
        Ok(delta.checkpoint)
    }

    pub fn export_incremental_to_path(
        &self,
        path: &Path,
        checkpoint: Option<&ExportCheckpoint>,
        options: &ExportOptions,
    ) -> Result<ExportCheckpoint> {
        let file = create_file(path)?;
        self.export_incremental(file, checkpoint, options)
    }

    /// Append a delta's records to the matching logs. Nothing is cleared.
    ///
    /// Records receive fresh local sequence numbers in delta order; their
    /// own identifiers (`id`, `ref_id`) are kept.
    pub fn import_delta<R: Read>(&self, source: R, options: &ImportOptions) -> Result<ImportSummary> {
        let raw = decode_raw(source, options)?;
        let delta = decode_delta(raw, options)?;
        Ok(self.apply_delta(delta, options))
    }

    pub fn import_delta_from_path(&self, path: &Path, options: &ImportOptions) -> Result<ImportSummary> {
        let file = File::open(path)
            .map_err(|e| DevtoolsError::io(format!("opening {}", path.display()), e))?;
        self.import_delta(file, options)
    }

    /// Validate and append an already-decoded delta.
    pub fn import_delta_data(
        &self,
        delta: IncrementalExportData,
        options: &ImportOptions,
    ) -> Result<ImportSummary> {
        validate_delta(&delta)?;
        Ok(self.apply_delta(delta, options))
    }

    fn apply_delta(
        &self,
        delta: IncrementalExportData,
        options: &ImportOptions,
    ) -> ImportSummary {
        let summary = ImportSummary {
            events: self.event_log().extend(delta.new_events),
            state: self.state_log().extend(delta.new_state),
            commands: self.command_log().extend(delta.new_commands),
            ..ImportSummary::default()
        };
        report(&options.progress, "events", summary.events, 1, 3);
        report(&options.progress, "state", summary.state, 2, 3);
        report(&options.progress, "commands", summary.commands, 3, 3);
        tracing::debug!(records = summary.total(), "delta import applied");
        summary
    }
}
