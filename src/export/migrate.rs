//! Version migration for imported envelopes.
//!
//! The importer treats a [`Migrator`] as a black box: raw data in, raw data
//! out, or an error when no path exists.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{DevtoolsError, Result};

pub trait Migrator: Send + Sync {
    fn migrate(&self, raw: Value, from: &str, to: &str) -> Result<Value>;
}

pub type MigrationStep = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Single-step transforms chained from version to version.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    steps: HashMap<String, (String, MigrationStep)>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the transform from `from` to `to`, replacing any existing
    /// step out of `from`.
    pub fn register<F>(&mut self, from: &str, to: &str, step: F)
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.steps
            .insert(from.to_string(), (to.to_string(), Arc::new(step)));
    }

    pub fn has_step(&self, from: &str) -> bool {
        self.steps.contains_key(from)
    }
}

impl Migrator for MigrationRegistry {
    fn migrate(&self, mut raw: Value, from: &str, to: &str) -> Result<Value> {
        let fail = |reason: String| DevtoolsError::Migration {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let mut current = from.to_string();
        let mut visited = HashSet::new();
        while current != to {
            if !visited.insert(current.clone()) {
                return Err(fail(format!("migration cycle at version {current}")));
            }
            let (next, step) = self
                .steps
                .get(&current)
                .ok_or_else(|| fail(format!("no migration registered from version {current}")))?;
            raw = (step.as_ref())(raw)
                .map_err(|e| fail(format!("step {current} -> {next} failed: {e}")))?;
            set_version(&mut raw, next);
            tracing::debug!(from = %current, to = %next, "applied export migration step");
            current = next.clone();
        }
        Ok(raw)
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut edges: Vec<_> = self
            .steps
            .iter()
            .map(|(from, (to, _))| format!("{from}->{to}"))
            .collect();
        edges.sort();
        f.debug_struct("MigrationRegistry")
            .field("steps", &edges)
            .finish()
    }
}

/// Write `version` into a full envelope or a delta's checkpoint.
fn set_version(raw: &mut Value, version: &str) {
    let Some(obj) = raw.as_object_mut() else {
        return;
    };
    let is_delta =
        !obj.contains_key("version") && obj.get("checkpoint").is_some_and(Value::is_object);
    let target = if is_delta {
        obj.get_mut("checkpoint").and_then(Value::as_object_mut)
    } else {
        Some(obj)
    };
    if let Some(target) = target {
        target.insert("version".into(), Value::String(version.to_string()));
    }
}
