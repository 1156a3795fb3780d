//! In-memory store: component graph, sequence logs and render statistics.
//!
//! The four graph indices share one lock; each sequence log has its own, so
//! appending an event never waits on a component-graph read.

pub mod adapter;
mod graph;
pub mod log;
mod performance;

use parking_lot::Mutex;

use crate::model::{
    CommandRecord, ComponentPerformance, ComponentSnapshot, ComponentStatus, ComponentTree,
    EventRecord, RenderSample, StateChange,
};
use crate::value::CapturedValue;

use self::graph::ComponentGraph;
use self::log::SequenceLog;
use self::performance::PerformanceData;

pub use self::adapter::StoreHooks;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Capacities for the three sequence logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCapacities {
    pub state: usize,
    pub events: usize,
    pub commands: usize,
}

impl Default for LogCapacities {
    fn default() -> Self {
        Self {
            state: DEFAULT_LOG_CAPACITY,
            events: DEFAULT_LOG_CAPACITY,
            commands: DEFAULT_LOG_CAPACITY,
        }
    }
}

pub struct Store {
    graph: Mutex<ComponentGraph>,
    performance: Mutex<PerformanceData>,
    state_log: SequenceLog<StateChange>,
    event_log: SequenceLog<EventRecord>,
    command_log: SequenceLog<CommandRecord>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(LogCapacities::default())
    }
}

impl Store {
    pub fn new(capacities: LogCapacities) -> Self {
        Self {
            graph: Mutex::new(ComponentGraph::default()),
            performance: Mutex::new(PerformanceData::default()),
            state_log: SequenceLog::new(capacities.state),
            event_log: SequenceLog::new(capacities.events),
            command_log: SequenceLog::new(capacities.commands),
        }
    }

    pub fn state_log(&self) -> &SequenceLog<StateChange> {
        &self.state_log
    }

    pub fn event_log(&self) -> &SequenceLog<EventRecord> {
        &self.event_log
    }

    pub fn command_log(&self) -> &SequenceLog<CommandRecord> {
        &self.command_log
    }

    // Component graph

    /// Insert or replace a snapshot by ID. Children and parent are rebuilt
    /// from the adjacency index; registered refs missing from `snapshot` are
    /// carried over.
    pub fn add_component(&self, snapshot: ComponentSnapshot) {
        self.graph.lock().upsert(snapshot);
    }

    /// Delete a snapshot and every index entry referencing it.
    pub fn remove_component(&self, id: &str) -> bool {
        let removed = self.graph.lock().remove(id);
        if removed {
            self.performance.lock().remove(id);
        }
        removed
    }

    /// Apply `f` to an existing snapshot. Returns `false` if it is unknown.
    pub fn update_component<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ComponentSnapshot),
    {
        let mut graph = self.graph.lock();
        match graph.get_mut(id) {
            Some(snapshot) => {
                f(snapshot);
                true
            }
            None => false,
        }
    }

    /// Mark a component unmounted without deleting it.
    pub fn mark_unmounted(&self, id: &str) -> bool {
        self.update_component(id, |snapshot| {
            snapshot.status = ComponentStatus::Unmounted;
            snapshot.timestamp = chrono::Utc::now();
        })
    }

    pub fn get_component(&self, id: &str) -> Option<ComponentSnapshot> {
        self.graph.lock().get(id).cloned()
    }

    /// Idempotent. The first registration inserts a placeholder ref into the
    /// owner's snapshot so the ref is visible before it ever changes.
    pub fn register_ref_owner(&self, component_id: &str, ref_id: &str) -> bool {
        self.graph.lock().register_ref_owner(component_id, ref_id)
    }

    pub fn ref_owner(&self, ref_id: &str) -> Option<String> {
        self.graph.lock().ref_owner(ref_id).map(str::to_string)
    }

    /// Returns `(owner_id, applied)`; `("", false)` for unregistered refs.
    pub fn update_ref_value(&self, ref_id: &str, value: CapturedValue) -> (String, bool) {
        self.graph.lock().update_ref(ref_id, None, value)
    }

    pub(crate) fn update_named_ref_value(
        &self,
        ref_id: &str,
        ref_name: &str,
        value: CapturedValue,
    ) -> (String, bool) {
        self.graph.lock().update_ref(ref_id, Some(ref_name), value)
    }

    pub fn add_component_child(&self, parent_id: &str, child_id: &str) -> bool {
        self.graph.lock().add_child(parent_id, child_id)
    }

    pub fn remove_component_child(&self, parent_id: &str, child_id: &str) -> bool {
        self.graph.lock().remove_child(parent_id, child_id)
    }

    pub fn get_component_children(&self, id: &str) -> Vec<ComponentSnapshot> {
        self.graph.lock().children_of(id)
    }

    /// Indexed child IDs, including children whose snapshots are pending.
    pub fn get_component_child_ids(&self, id: &str) -> Vec<String> {
        self.graph.lock().child_ids(id)
    }

    pub fn get_root_components(&self) -> Vec<ComponentSnapshot> {
        self.graph.lock().roots()
    }

    pub fn get_all_components(&self) -> Vec<ComponentSnapshot> {
        self.graph.lock().all()
    }

    pub fn component_count(&self) -> usize {
        self.graph.lock().len()
    }

    pub fn component_tree(&self, id: &str) -> Option<ComponentTree> {
        self.graph.lock().tree(id)
    }

    /// Replace the whole graph with `snapshots`, rebuilding edges from each
    /// snapshot's `children` list.
    pub(crate) fn replace_components(&self, snapshots: Vec<ComponentSnapshot>) {
        let mut graph = self.graph.lock();
        graph.clear();
        let edges: Vec<(String, String)> = snapshots
            .iter()
            .flat_map(|s| s.children.iter().map(|c| (s.id.clone(), c.clone())))
            .collect();
        let owners: Vec<(String, String)> = snapshots
            .iter()
            .flat_map(|s| s.refs.iter().map(|r| (s.id.clone(), r.id.clone())))
            .collect();
        for (parent, child) in &edges {
            graph.add_child(parent, child);
        }
        for (owner, ref_id) in &owners {
            graph.register_ref_owner(owner, ref_id);
        }
        for snapshot in snapshots {
            graph.upsert(snapshot);
        }
    }

    // Logs

    pub fn record_state_change(&self, change: StateChange) -> u64 {
        self.state_log.append(change)
    }

    pub fn record_event(&self, event: EventRecord) -> u64 {
        self.event_log.append(event)
    }

    pub fn record_command(&self, command: CommandRecord) -> u64 {
        self.command_log.append(command)
    }

    // Performance

    pub fn record_render(&self, sample: &RenderSample) {
        self.performance.lock().record(sample);
    }

    pub fn performance_snapshot(&self) -> Vec<ComponentPerformance> {
        self.performance.lock().snapshot()
    }

    pub fn component_performance(&self, component_id: &str) -> Option<ComponentPerformance> {
        self.performance.lock().get(component_id).cloned()
    }

    pub(crate) fn replace_performance(&self, entries: Vec<ComponentPerformance>) {
        self.performance.lock().replace(entries);
    }

    /// Empty everything. Sequence counters keep their values.
    pub fn clear(&self) {
        self.graph.lock().clear();
        self.performance.lock().clear();
        self.state_log.clear();
        self.event_log.clear();
        self.command_log.clear();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("components", &self.component_count())
            .field("state_log", &self.state_log)
            .field("event_log", &self.event_log)
            .field("command_log", &self.command_log)
            .finish()
    }
}
