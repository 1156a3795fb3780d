//! Error types for the devtools data plane.

use thiserror::Error;

/// Errors returned by store, export/import and sanitizer operations.
///
/// Ownership misses (updating an unregistered ref, removing a hook that was
/// never added) are not errors; those operations report through their return
/// value instead.
#[derive(Error, Debug)]
pub enum DevtoolsError {
    /// Bad options or an import payload that failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing or malformed checkpoint passed to an incremental operation.
    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// A sanitization rule whose pattern does not compile.
    #[error("Invalid pattern for rule '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// No codec registered under the requested format name.
    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    /// A registered codec failed to encode or decode.
    #[error("{format} codec error: {reason}")]
    Codec { format: String, reason: String },

    /// No migration path between two export versions, or a step failed.
    #[error("Cannot migrate export from version {from} to {to}: {reason}")]
    Migration {
        from: String,
        to: String,
        reason: String,
    },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error while {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DevtoolsError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DevtoolsError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        DevtoolsError::Serialization {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DevtoolsError>;
