//! Scripted sessions and hook doubles.

use std::time::Duration;

use parking_lot::Mutex;
use tuiscope::hooks::HookFault;
use tuiscope::store::log::Sequenced;
use tuiscope::{
    CapturedValue, CommandRecord, ComponentInfo, DevTools, ErrorSink, EventHook, EventRecord,
    Instrumentor, Store,
};

use super::determinism::DeterministicClock;

/// Drives a [`DevTools`] collector the way a host framework would.
pub struct ScriptedSession {
    pub devtools: DevTools,
    pub instrumentor: Instrumentor,
    clock: DeterministicClock,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::with_devtools(DevTools::default())
    }

    pub fn with_devtools(devtools: DevTools) -> Self {
        let instrumentor = devtools.instrumentor();
        Self {
            devtools,
            instrumentor,
            clock: DeterministicClock::new(),
        }
    }

    pub fn store(&self) -> &Store {
        self.devtools.store()
    }

    pub fn mount(&self, id: &str, name: &str, parent: Option<&str>) {
        let mut info = ComponentInfo::new(id, name);
        if let Some(parent) = parent {
            info = info.with_parent(parent);
        }
        self.instrumentor.component_mounted(&info);
    }

    pub fn event(&self, name: &str, source: &str, payload: impl Into<CapturedValue>) {
        let mut event = EventRecord::new(name, source, payload.into()).with_id(self.clock.next_id());
        event.timestamp = self.clock.now();
        self.instrumentor.event(&event);
    }

    pub fn command(&self, command_type: &str, source: &str) {
        let mut command = CommandRecord::new(command_type, source);
        command.id = self.clock.next_id();
        command.generated = self.clock.now();
        self.instrumentor.command_generated(&command);
    }

    pub fn set_ref(&self, owner: &str, ref_id: &str, old: i64, new: i64) {
        self.instrumentor.ref_changed(Some(owner), ref_id, ref_id, old, new);
    }

    pub fn render(&self, id: &str, name: &str, millis: u64) {
        self.instrumentor
            .render_complete(id, name, Duration::from_millis(millis));
    }

    /// A small counter app: root, a button child, one ref, a click.
    pub fn counter_app() -> Self {
        let session = Self::new();
        session.mount("app", "App", None);
        session.mount("btn", "Button", Some("app"));
        session.instrumentor.component_updated(
            &ComponentInfo::new("app", "App").with_ref("count", "count"),
        );
        session.set_ref("app", "count", 0, 1);
        session.event("click", "btn", "password=hunter2");
        session.command("persist", "app");
        session.render("app", "App", 3);
        session
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Records fault reports.
#[derive(Default)]
pub struct CollectingSink {
    pub faults: Mutex<Vec<HookFault>>,
}

impl ErrorSink for CollectingSink {
    fn report(&self, fault: &HookFault) {
        self.faults.lock().push(fault.clone());
    }
}

/// Panics on every event.
pub struct PanickingEventHook;

impl EventHook for PanickingEventHook {
    fn on_event(&self, event: &EventRecord) {
        panic!("hook failed on {}", event.name);
    }
}

/// Log entries with their sequence numbers zeroed, for content comparison
/// across stores.
pub fn unsequenced<T: Sequenced + Clone>(entries: Vec<T>) -> Vec<T> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.assign_sequence(0);
            entry
        })
        .collect()
}

pub fn event_names(store: &Store) -> Vec<String> {
    store
        .event_log()
        .get_all()
        .into_iter()
        .map(|e| e.name)
        .collect()
}
