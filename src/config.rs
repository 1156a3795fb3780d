use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{DevtoolsError, Result};
use crate::export::codec::DEFAULT_FORMAT;
use crate::export::{ExportOptions, ImportOptions, SanitizeMode};
use crate::sanitize::{
    SanitizeOptions, Sanitizer, DEFAULT_MAX_PREVIEW_LEN, DEFAULT_STREAM_BUFFER_SIZE, REDACTED,
};
use crate::store::{LogCapacities, DEFAULT_LOG_CAPACITY};

/// Collector configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DevtoolsConfig {
    /// Retained state changes
    pub state_capacity: usize,
    /// Retained events
    pub event_capacity: usize,
    /// Retained commands
    pub command_capacity: usize,
    pub export: ExportConfig,
    pub sanitize: SanitizeConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Codec name (`json`, `json-pretty`)
    pub format: String,
    /// Gzip exported files
    pub compress: bool,
    pub include_components: bool,
    pub include_state: bool,
    pub include_events: bool,
    pub include_commands: bool,
    pub include_performance: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeConfig {
    /// Start from the built-in rule set
    pub default_rules: bool,
    /// Buffer size for streaming redaction
    pub stream_buffer_size: usize,
    /// Preview truncation length for dry runs
    pub max_preview_len: usize,
    /// Extra rules, added after the defaults
    pub rules: Vec<RuleConfig>,
}

/// A user-defined redaction rule
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default = "default_replacement")]
    pub replacement: String,
    #[serde(default)]
    pub priority: i32,
}

fn default_replacement() -> String {
    REDACTED.to_string()
}

impl Default for DevtoolsConfig {
    fn default() -> Self {
        Self {
            state_capacity: DEFAULT_LOG_CAPACITY,
            event_capacity: DEFAULT_LOG_CAPACITY,
            command_capacity: DEFAULT_LOG_CAPACITY,
            export: ExportConfig {
                format: DEFAULT_FORMAT.to_string(),
                compress: false,
                include_components: true,
                include_state: true,
                include_events: true,
                include_commands: true,
                include_performance: true,
            },
            sanitize: SanitizeConfig {
                default_rules: true,
                stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
                max_preview_len: DEFAULT_MAX_PREVIEW_LEN,
                rules: Vec::new(),
            },
        }
    }
}

/// TOML representation of the config file. Every field is optional and
/// merged over [`DevtoolsConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub capacity: Option<TomlCapacityConfig>,
    pub export: Option<TomlExportConfig>,
    pub sanitize: Option<TomlSanitizeConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlCapacityConfig {
    pub state: Option<usize>,
    pub events: Option<usize>,
    pub commands: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlExportConfig {
    pub format: Option<String>,
    pub compress: Option<bool>,
    pub include_components: Option<bool>,
    pub include_state: Option<bool>,
    pub include_events: Option<bool>,
    pub include_commands: Option<bool>,
    pub include_performance: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlSanitizeConfig {
    pub default_rules: Option<bool>,
    pub stream_buffer_size: Option<usize>,
    pub max_preview_len: Option<usize>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Default config file location (~/.tuiscope/config.toml)
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tuiscope"))
        .unwrap_or_else(|| PathBuf::from(".tuiscope"))
        .join("config.toml")
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl DevtoolsConfig {
    /// Load the user config, falling back to defaults when it is missing or
    /// unusable.
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "ignoring unusable config file"
                );
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DevtoolsError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(contents).map_err(|e| DevtoolsError::Config(e.to_string()))?;

        let mut config = Self::default();

        if let Some(capacity) = toml_config.capacity {
            merge(&mut config.state_capacity, capacity.state);
            merge(&mut config.event_capacity, capacity.events);
            merge(&mut config.command_capacity, capacity.commands);
        }

        if let Some(export) = toml_config.export {
            let target = &mut config.export;
            merge(&mut target.format, export.format);
            merge(&mut target.compress, export.compress);
            merge(&mut target.include_components, export.include_components);
            merge(&mut target.include_state, export.include_state);
            merge(&mut target.include_events, export.include_events);
            merge(&mut target.include_commands, export.include_commands);
            merge(&mut target.include_performance, export.include_performance);
        }

        if let Some(sanitize) = toml_config.sanitize {
            let target = &mut config.sanitize;
            merge(&mut target.default_rules, sanitize.default_rules);
            merge(&mut target.stream_buffer_size, sanitize.stream_buffer_size);
            merge(&mut target.max_preview_len, sanitize.max_preview_len);
            target.rules = sanitize.rules;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, capacity) in [
            ("state", self.state_capacity),
            ("events", self.event_capacity),
            ("commands", self.command_capacity),
        ] {
            if capacity == 0 {
                return Err(DevtoolsError::Validation(format!(
                    "{name} capacity must be positive"
                )));
            }
        }
        if self.sanitize.stream_buffer_size == 0 {
            return Err(DevtoolsError::Validation(
                "stream buffer size must be positive".to_string(),
            ));
        }
        if self.export.format.trim().is_empty() {
            return Err(DevtoolsError::Validation("export format is empty".to_string()));
        }
        Ok(())
    }

    pub fn log_capacities(&self) -> LogCapacities {
        LogCapacities {
            state: self.state_capacity,
            events: self.event_capacity,
            commands: self.command_capacity,
        }
    }

    /// Default rules (if enabled) followed by the configured ones.
    pub fn build_sanitizer(&self) -> Result<Sanitizer> {
        let sanitizer = if self.sanitize.default_rules {
            Sanitizer::with_default_rules()
        } else {
            Sanitizer::new()
        };
        for rule in &self.sanitize.rules {
            sanitizer.add_pattern(&rule.pattern, &rule.replacement, rule.priority, &rule.name)?;
        }
        Ok(sanitizer)
    }

    pub fn sanitize_options(&self, dry_run: bool) -> SanitizeOptions {
        SanitizeOptions {
            dry_run,
            max_preview_len: self.sanitize.max_preview_len,
        }
    }

    pub fn export_options(&self, sanitizer: Option<Arc<Sanitizer>>) -> ExportOptions {
        ExportOptions {
            include_components: self.export.include_components,
            include_state: self.export.include_state,
            include_events: self.export.include_events,
            include_commands: self.export.include_commands,
            include_performance: self.export.include_performance,
            sanitizer,
            sanitize_mode: SanitizeMode::Tree,
            format: self.export.format.clone(),
            compress: self.export.compress,
            ..ExportOptions::default()
        }
    }

    /// Export options that redact through the streaming writer.
    pub fn streaming_export_options(&self, sanitizer: Arc<Sanitizer>) -> ExportOptions {
        ExportOptions {
            sanitize_mode: SanitizeMode::Stream {
                buffer_size: self.sanitize.stream_buffer_size,
            },
            ..self.export_options(Some(sanitizer))
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            format: self.export.format.clone(),
            ..ImportOptions::default()
        }
    }
}
