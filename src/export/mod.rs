//! Full and incremental export/import of store contents.
//!
//! A full export writes an [`ExportData`] envelope and hands back an
//! [`ExportCheckpoint`]: one high-water mark per sequence log. Passing that
//! checkpoint to [`Store::export_incremental`] writes only what was appended
//! since, and returns the next checkpoint. Replaying a full export followed
//! by each delta in order rebuilds content-equal logs in another store.
//!
//! Imports decode, migrate (when the version differs), and validate before
//! mutating anything; a rejected payload leaves the destination untouched.

pub mod checkpoint;
pub mod codec;
pub mod migrate;
pub mod validate;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DevtoolsError, Result};
use crate::model::{CommandRecord, ComponentPerformance, ComponentSnapshot, EventRecord, StateChange};
use crate::sanitize::{join_field, redact_fields, Redact, Sanitizer};
use crate::store::Store;

use self::checkpoint::{ExportCheckpoint, IncrementalExportData};
use self::codec::{encode_to, read_payload, Codec, CodecRegistry, DEFAULT_FORMAT};
use self::migrate::Migrator;
use self::validate::{validate_delta, validate_export};

pub const EXPORT_VERSION: &str = "1.0";

/// Full-snapshot envelope. Absent sections were not requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportData {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<ComponentSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<StateChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<CommandRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<Vec<ComponentPerformance>>,
    /// Marks at export time, so the file alone can seed the next delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<ExportCheckpoint>,
}

impl ExportData {
    pub fn empty() -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            timestamp: Utc::now(),
            components: None,
            state: None,
            events: None,
            commands: None,
            performance: None,
            checkpoint: None,
        }
    }
}

redact_fields!(ExportData; components, state, events, commands, performance);

/// Either kind of envelope, as found in a file.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Full(ExportData),
    Delta(IncrementalExportData),
}

impl Redact for Envelope {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
        match self {
            Envelope::Full(data) => data.redact_strings(path, visit),
            Envelope::Delta(delta) => delta.redact_strings(path, visit),
        }
    }

    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String)) {
        match self {
            Envelope::Full(data) => data.redact_strings_mut(path, visit),
            Envelope::Delta(delta) => delta.redact_strings_mut(path, visit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Redact the captured structure before serializing.
    Tree,
    /// Redact the serialized text through a bounded buffer.
    Stream { buffer_size: usize },
}

/// Progress notice, sent once per section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub section: &'static str,
    pub items: usize,
    pub sections_done: usize,
    pub sections_total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

#[derive(Clone)]
pub struct ExportOptions {
    pub include_components: bool,
    pub include_state: bool,
    pub include_events: bool,
    pub include_commands: bool,
    pub include_performance: bool,
    pub sanitizer: Option<Arc<Sanitizer>>,
    pub sanitize_mode: SanitizeMode,
    pub format: String,
    pub compress: bool,
    pub codecs: Arc<CodecRegistry>,
    pub progress: Option<ProgressCallback>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_components: true,
            include_state: true,
            include_events: true,
            include_commands: true,
            include_performance: true,
            sanitizer: None,
            sanitize_mode: SanitizeMode::Tree,
            format: DEFAULT_FORMAT.to_string(),
            compress: false,
            codecs: Arc::new(CodecRegistry::with_defaults()),
            progress: None,
        }
    }
}

impl ExportOptions {
    pub fn with_sanitizer(mut self, sanitizer: Arc<Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn streaming(mut self, buffer_size: usize) -> Self {
        self.sanitize_mode = SanitizeMode::Stream { buffer_size };
        self
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn section_count(&self) -> usize {
        [
            self.include_components,
            self.include_state,
            self.include_events,
            self.include_commands,
            self.include_performance,
        ]
        .iter()
        .filter(|included| **included)
        .count()
    }

    fn validate(&self) -> Result<()> {
        if self.section_count() == 0 {
            return Err(DevtoolsError::Validation(
                "export options select no sections".to_string(),
            ));
        }
        if let SanitizeMode::Stream { buffer_size: 0 } = self.sanitize_mode {
            return Err(DevtoolsError::Validation(
                "stream sanitize buffer size must be positive".to_string(),
            ));
        }
        self.codecs.get(&self.format).map(|_| ())
    }

    fn tree_sanitizer(&self) -> Option<&Sanitizer> {
        match self.sanitize_mode {
            SanitizeMode::Tree => self.sanitizer.as_deref(),
            SanitizeMode::Stream { .. } => None,
        }
    }
}

impl std::fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOptions")
            .field("sections", &self.section_count())
            .field("sanitize", &self.sanitizer.is_some())
            .field("sanitize_mode", &self.sanitize_mode)
            .field("format", &self.format)
            .field("compress", &self.compress)
            .finish()
    }
}

#[derive(Clone)]
pub struct ImportOptions {
    pub format: String,
    pub codecs: Arc<CodecRegistry>,
    pub migrator: Option<Arc<dyn Migrator>>,
    /// Version payloads are migrated to before validation.
    pub target_version: String,
    pub progress: Option<ProgressCallback>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            codecs: Arc::new(CodecRegistry::with_defaults()),
            migrator: None,
            target_version: EXPORT_VERSION.to_string(),
            progress: None,
        }
    }
}

impl ImportOptions {
    pub fn with_migrator(mut self, migrator: Arc<dyn Migrator>) -> Self {
        self.migrator = Some(migrator);
        self
    }
}

/// Counts of records applied by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub components: usize,
    pub state: usize,
    pub events: usize,
    pub commands: usize,
    pub performance: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.components + self.state + self.events + self.commands + self.performance
    }
}

/// Runs an inner codec through a [`crate::sanitize::SanitizingWriter`].
struct StreamSanitizedCodec<'a> {
    inner: &'a dyn Codec,
    sanitizer: &'a Sanitizer,
    buffer_size: usize,
}

impl Codec for StreamSanitizedCodec<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn encode(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        let mut writer = self.sanitizer.stream_writer(out, self.buffer_size);
        self.inner.encode(value, &mut writer)?;
        writer
            .finish()
            .map_err(|e| DevtoolsError::io("flushing sanitized stream", e))?;
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> Result<Value> {
        self.inner.decode(input)
    }
}

pub(crate) fn write_envelope<T: Serialize>(
    envelope: &T,
    out: &mut dyn Write,
    options: &ExportOptions,
) -> Result<()> {
    let codec = options.codecs.get(&options.format)?;
    let raw = serde_json::to_value(envelope)
        .map_err(|e| DevtoolsError::serialization("encoding export envelope", e))?;

    match (&options.sanitizer, options.sanitize_mode) {
        (Some(sanitizer), SanitizeMode::Stream { buffer_size }) => {
            let streaming = StreamSanitizedCodec {
                inner: codec.as_ref(),
                sanitizer,
                buffer_size,
            };
            encode_to(&streaming, &raw, out, options.compress)
        }
        _ => encode_to(codec.as_ref(), &raw, out, options.compress),
    }
}

fn report(progress: &Option<ProgressCallback>, section: &'static str, items: usize, done: usize, total: usize) {
    if let Some(progress) = progress {
        progress(&Progress {
            section,
            items,
            sections_done: done,
            sections_total: total,
        });
    }
}

fn decode_raw<R: Read>(source: R, options: &ImportOptions) -> Result<Value> {
    let bytes = read_payload(source)?;
    options.codecs.get(&options.format)?.decode(&bytes)
}

fn is_delta_shape(raw: &Value) -> bool {
    raw.get("checkpoint").is_some_and(Value::is_object)
        && ["new_events", "new_state", "new_commands"]
            .iter()
            .any(|key| raw.get(*key).is_some())
}

fn migrate_to_target(raw: Value, version: &str, options: &ImportOptions) -> Result<Value> {
    if version.trim().is_empty() {
        return Err(DevtoolsError::Validation("version is missing".to_string()));
    }
    if version == options.target_version {
        return Ok(raw);
    }
    match &options.migrator {
        Some(migrator) => migrator.migrate(raw, version, &options.target_version),
        None => Err(DevtoolsError::Migration {
            from: version.to_string(),
            to: options.target_version.clone(),
            reason: "no migrator configured".to_string(),
        }),
    }
}

fn decode_full(raw: Value, options: &ImportOptions) -> Result<ExportData> {
    if is_delta_shape(&raw) {
        return Err(DevtoolsError::Validation(
            "expected a full export, found an incremental export".to_string(),
        ));
    }
    let version = raw
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let raw = migrate_to_target(raw, &version, options)?;
    let data: ExportData = serde_json::from_value(raw)
        .map_err(|e| DevtoolsError::serialization("decoding export envelope", e))?;
    validate_export(&data)?;
    Ok(data)
}

pub(crate) fn decode_delta(raw: Value, options: &ImportOptions) -> Result<IncrementalExportData> {
    if !is_delta_shape(&raw) {
        return Err(DevtoolsError::Validation(
            "expected an incremental export, found a full export".to_string(),
        ));
    }
    let version = raw
        .get("checkpoint")
        .and_then(|c| c.get("version"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let raw = migrate_to_target(raw, &version, options)?;
    let delta: IncrementalExportData = serde_json::from_value(raw)
        .map_err(|e| DevtoolsError::serialization("decoding incremental export", e))?;
    validate_delta(&delta)?;
    Ok(delta)
}

/// Decode, migrate and validate either envelope kind.
pub fn read_envelope<R: Read>(source: R, options: &ImportOptions) -> Result<Envelope> {
    let raw = decode_raw(source, options)?;
    if is_delta_shape(&raw) {
        decode_delta(raw, options).map(Envelope::Delta)
    } else {
        decode_full(raw, options).map(Envelope::Full)
    }
}

pub fn read_envelope_from_path(path: &Path, options: &ImportOptions) -> Result<Envelope> {
    let file = File::open(path)
        .map_err(|e| DevtoolsError::io(format!("opening {}", path.display()), e))?;
    read_envelope(file, options)
}

/// Encode an already-built envelope.
pub fn write_envelope_to<W: Write>(envelope: &Envelope, mut dest: W, options: &ExportOptions) -> Result<()> {
    let sanitized;
    let envelope = match options.tree_sanitizer() {
        Some(sanitizer) => {
            sanitized = sanitizer.sanitize(envelope);
            &sanitized
        }
        None => envelope,
    };
    match envelope {
        Envelope::Full(data) => write_envelope(data, &mut dest, options)?,
        Envelope::Delta(delta) => write_envelope(delta, &mut dest, options)?,
    }
    dest.flush()
        .map_err(|e| DevtoolsError::io("flushing export", e))
}

pub(crate) fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| DevtoolsError::io(format!("creating {}", parent.display()), e))?;
    }
    let file = File::create(path)
        .map_err(|e| DevtoolsError::io(format!("creating {}", path.display()), e))?;
    Ok(BufWriter::new(file))
}

impl Store {
    /// Snapshot the selected sections plus a checkpoint of every log.
    pub fn build_export(&self, options: &ExportOptions) -> (ExportData, ExportCheckpoint) {
        let total = options.section_count();
        let mut done = 0;
        let mut data = ExportData::empty();

        let (state, last_state_id) = self.state_log().snapshot();
        let (events, last_event_id) = self.event_log().snapshot();
        let (commands, last_command_id) = self.command_log().snapshot();

        if options.include_components {
            let components = self.get_all_components();
            done += 1;
            report(&options.progress, "components", components.len(), done, total);
            data.components = Some(components);
        }
        if options.include_state {
            done += 1;
            report(&options.progress, "state", state.len(), done, total);
            data.state = Some(state);
        }
        if options.include_events {
            done += 1;
            report(&options.progress, "events", events.len(), done, total);
            data.events = Some(events);
        }
        if options.include_commands {
            done += 1;
            report(&options.progress, "commands", commands.len(), done, total);
            data.commands = Some(commands);
        }
        if options.include_performance {
            let performance = self.performance_snapshot();
            done += 1;
            report(&options.progress, "performance", performance.len(), done, total);
            data.performance = Some(performance);
        }

        let checkpoint = ExportCheckpoint {
            version: EXPORT_VERSION.to_string(),
            timestamp: data.timestamp,
            last_event_id,
            last_state_id,
            last_command_id,
        };
        data.checkpoint = Some(checkpoint.clone());
        (data, checkpoint)
    }

    /// Write a full export and return the checkpoint for the next delta.
    pub fn export_full<W: Write>(&self, mut dest: W, options: &ExportOptions) -> Result<ExportCheckpoint> {
        options.validate()?;
        let (mut data, checkpoint) = self.build_export(options);
        if let Some(sanitizer) = options.tree_sanitizer() {
            data = sanitizer.sanitize(&data);
        }

        write_envelope(&data, &mut dest, options)?;
        dest.flush()
            .map_err(|e| DevtoolsError::io("flushing full export", e))?;

        tracing::debug!(
            components = data.components.as_ref().map_or(0, Vec::len),
            state = data.state.as_ref().map_or(0, Vec::len),
            events = data.events.as_ref().map_or(0, Vec::len),
            commands = data.commands.as_ref().map_or(0, Vec::len),
            "full export written"
        );
        Ok(checkpoint)
    }

    pub fn export_full_to_path(&self, path: &Path, options: &ExportOptions) -> Result<ExportCheckpoint> {
        let file = create_file(path)?;
        self.export_full(file, options)
    }

    /// Replace the store contents with a full export.
    ///
    /// Records get fresh local sequence numbers in file order.
    pub fn import<R: Read>(&self, source: R, options: &ImportOptions) -> Result<ImportSummary> {
        let raw = decode_raw(source, options)?;
        let data = decode_full(raw, options)?;
        Ok(self.apply_full(data, options))
    }

    pub fn import_from_path(&self, path: &Path, options: &ImportOptions) -> Result<ImportSummary> {
        let file = File::open(path)
            .map_err(|e| DevtoolsError::io(format!("opening {}", path.display()), e))?;
        self.import(file, options)
    }

    /// Validate and apply an already-decoded full export.
    pub fn import_data(&self, data: ExportData, options: &ImportOptions) -> Result<ImportSummary> {
        validate_export(&data)?;
        Ok(self.apply_full(data, options))
    }

    fn apply_full(&self, data: ExportData, options: &ImportOptions) -> ImportSummary {
        let total = [
            data.components.is_some(),
            data.state.is_some(),
            data.events.is_some(),
            data.commands.is_some(),
            data.performance.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let mut done = 0;
        let mut summary = ImportSummary::default();

        self.clear();

        if let Some(components) = data.components {
            summary.components = components.len();
            self.replace_components(components);
            done += 1;
            report(&options.progress, "components", summary.components, done, total);
        }
        if let Some(state) = data.state {
            summary.state = self.state_log().extend(state);
            done += 1;
            report(&options.progress, "state", summary.state, done, total);
        }
        if let Some(events) = data.events {
            summary.events = self.event_log().extend(events);
            done += 1;
            report(&options.progress, "events", summary.events, done, total);
        }
        if let Some(commands) = data.commands {
            summary.commands = self.command_log().extend(commands);
            done += 1;
            report(&options.progress, "commands", summary.commands, done, total);
        }
        if let Some(performance) = data.performance {
            summary.performance = performance.len();
            self.replace_performance(performance);
            done += 1;
            report(&options.progress, "performance", summary.performance, done, total);
        }

        tracing::debug!(records = summary.total(), "full import applied");
        summary
    }
}
