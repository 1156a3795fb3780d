//! Captured record types shared by the store, hooks and export layers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::log::Sequenced;
use crate::value::{CapturedValue, ValueMap};

/// Lifecycle status of a component as last observed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[default]
    Created,
    Mounted,
    Updated,
    Unmounted,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Created => "created",
            ComponentStatus::Mounted => "mounted",
            ComponentStatus::Updated => "updated",
            ComponentStatus::Unmounted => "unmounted",
        }
    }
}

/// Non-owning back-reference to a parent component. Never expanded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentRef {
    pub id: String,
    pub name: String,
}

/// Latest known state of one component.
///
/// `children` lists child IDs in insertion order and is kept in lockstep with
/// the store's adjacency index. Use [`crate::Store::component_tree`] for an
/// owned, nested view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentSnapshot {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub component_type: String,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: ComponentStatus,
    #[serde(default)]
    pub props: ValueMap,
    #[serde(default)]
    pub state: ValueMap,
    #[serde(default)]
    pub refs: Vec<RefSnapshot>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
}

impl ComponentSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            component_type: name.clone(),
            name,
            timestamp: Utc::now(),
            status: ComponentStatus::Created,
            props: ValueMap::new(),
            state: ValueMap::new(),
            refs: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = component_type.into();
        self
    }

    pub fn with_props(mut self, props: ValueMap) -> Self {
        self.props = props;
        self
    }

    pub fn with_status(mut self, status: ComponentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn find_ref(&self, ref_id: &str) -> Option<&RefSnapshot> {
        self.refs.iter().find(|r| r.id == ref_id)
    }
}

/// A component snapshot with its descendants materialised.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTree {
    pub snapshot: ComponentSnapshot,
    pub children: Vec<ComponentTree>,
}

impl ComponentTree {
    /// Total number of nodes including this one.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ComponentTree::node_count)
            .sum::<usize>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefSnapshot {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub value: CapturedValue,
    #[serde(default)]
    pub watchers: u32,
}

impl RefSnapshot {
    pub const UNKNOWN_TYPE: &'static str = "unknown";

    pub fn new(id: impl Into<String>, name: impl Into<String>, value: CapturedValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_tag: value.type_tag().to_string(),
            value,
            watchers: 0,
        }
    }

    /// Entry for a ref whose value has not been observed yet.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            type_tag: Self::UNKNOWN_TYPE.to_string(),
            value: CapturedValue::Null,
            watchers: 0,
        }
    }
}

/// One reactive-state mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateChange {
    #[serde(default)]
    pub id: u64,
    pub ref_id: String,
    #[serde(default)]
    pub ref_name: String,
    #[serde(default)]
    pub old_value: CapturedValue,
    #[serde(default)]
    pub new_value: CapturedValue,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
}

impl StateChange {
    pub fn new(
        ref_id: impl Into<String>,
        ref_name: impl Into<String>,
        old_value: CapturedValue,
        new_value: CapturedValue,
    ) -> Self {
        Self {
            id: 0,
            ref_id: ref_id.into(),
            ref_name: ref_name.into(),
            old_value,
            new_value,
            timestamp: Utc::now(),
            source: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

impl Sequenced for StateChange {
    fn sequence(&self) -> u64 {
        self.id
    }

    fn assign_sequence(&mut self, seq: u64) {
        self.id = seq;
    }
}

/// An application event emitted by a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    #[serde(default)]
    pub seq_id: u64,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: CapturedValue,
}

impl EventRecord {
    pub fn new(name: impl Into<String>, source_id: impl Into<String>, payload: CapturedValue) -> Self {
        Self {
            seq_id: 0,
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            source_id: source_id.into(),
            target_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }
}

impl Sequenced for EventRecord {
    fn sequence(&self) -> u64 {
        self.seq_id
    }

    fn assign_sequence(&mut self, seq: u64) {
        self.seq_id = seq;
    }
}

/// A side-effecting command generated by a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRecord {
    #[serde(default)]
    pub seq_id: u64,
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub generated: DateTime<Utc>,
    #[serde(default)]
    pub payload: CapturedValue,
}

impl CommandRecord {
    pub fn new(command_type: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            seq_id: 0,
            id: Uuid::new_v4().to_string(),
            command_type: command_type.into(),
            source_id: source_id.into(),
            generated: Utc::now(),
            payload: CapturedValue::Null,
        }
    }

    pub fn with_payload(mut self, payload: CapturedValue) -> Self {
        self.payload = payload;
        self
    }
}

impl Sequenced for CommandRecord {
    fn sequence(&self) -> u64 {
        self.seq_id
    }

    fn assign_sequence(&mut self, seq: u64) {
        self.seq_id = seq;
    }
}

/// One completed render reported by the host framework.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSample {
    pub component_id: String,
    pub component_name: String,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl RenderSample {
    pub fn new(
        component_id: impl Into<String>,
        component_name: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            component_name: component_name.into(),
            duration,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated render statistics for one component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentPerformance {
    pub component_id: String,
    pub component_name: String,
    pub render_count: u64,
    pub total_render_time: Duration,
    pub min_render_time: Duration,
    pub max_render_time: Duration,
    pub avg_render_time: Duration,
    pub last_update: DateTime<Utc>,
}
