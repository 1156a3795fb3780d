//! Instrumentation hook bus.
//!
//! The host framework reports lifecycle points through an [`Instrumentor`].
//! Each notification fans out synchronously, in registration order, to every
//! hook registered in the matching category. A panicking hook is isolated: the
//! remaining hooks still run, the notifier never sees the panic, and the fault
//! goes to the configured [`ErrorSink`] (or the log when none is set).

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::model::{CommandRecord, EventRecord, RenderSample, StateChange};
use crate::value::{CapturedValue, ValueMap};

/// What the framework knows about a component at a lifecycle point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentInfo {
    pub id: String,
    pub name: String,
    pub component_type: String,
    pub parent_id: Option<String>,
    pub props: ValueMap,
    pub refs: Vec<RefInfo>,
}

impl ComponentInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            component_type: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_props(mut self, props: ValueMap) -> Self {
        self.props = props;
        self
    }

    pub fn with_ref(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.refs.push(RefInfo {
            id: id.into(),
            name: name.into(),
            value: None,
            watchers: 0,
        });
        self
    }
}

/// A reactive ref owned by a component.
#[derive(Debug, Clone, PartialEq)]
pub struct RefInfo {
    pub id: String,
    pub name: String,
    /// Current value if the framework already knows it.
    pub value: Option<CapturedValue>,
    pub watchers: u32,
}

pub trait ComponentHook: Send + Sync {
    fn on_component_created(&self, _component: &ComponentInfo) {}
    fn on_component_mounted(&self, _component: &ComponentInfo) {}
    fn on_component_updated(&self, _component: &ComponentInfo) {}
    fn on_component_unmounted(&self, _component_id: &str) {}
}

pub trait StateHook: Send + Sync {
    fn on_ref_changed(&self, owner_id: Option<&str>, change: &StateChange);
}

pub trait EventHook: Send + Sync {
    fn on_event(&self, _event: &EventRecord) {}
    fn on_command_generated(&self, _command: &CommandRecord) {}
}

pub trait PerformanceHook: Send + Sync {
    fn on_render_complete(&self, sample: &RenderSample);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookCategory {
    Component,
    State,
    Event,
    Performance,
}

impl fmt::Display for HookCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookCategory::Component => "component",
            HookCategory::State => "state",
            HookCategory::Event => "event",
            HookCategory::Performance => "performance",
        };
        f.write_str(name)
    }
}

/// A hook that panicked while handling a notification.
#[derive(Debug, Clone)]
pub struct HookFault {
    pub category: HookCategory,
    /// Notification being delivered, e.g. `component_mounted`.
    pub notification: &'static str,
    pub hook_id: HookId,
    pub message: String,
}

pub trait ErrorSink: Send + Sync {
    fn report(&self, fault: &HookFault);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(u64);

struct Entries<H: ?Sized> {
    hooks: BTreeMap<u64, Arc<H>>,
    /// Cached list handed to `fire`; rebuilt after a mutation.
    snapshot: Option<Arc<[(HookId, Arc<H>)]>>,
}

/// Ordered set of hooks of one category.
///
/// `fire` iterates a shared snapshot outside the lock, so hooks may add or
/// remove hooks (or fire again) without deadlocking. Changes take effect for
/// the next notification.
pub struct HookRegistry<H: ?Sized> {
    category: HookCategory,
    next_id: AtomicU64,
    len: AtomicUsize,
    entries: Mutex<Entries<H>>,
}

impl<H: ?Sized> HookRegistry<H> {
    pub fn new(category: HookCategory) -> Self {
        Self {
            category,
            next_id: AtomicU64::new(1),
            len: AtomicUsize::new(0),
            entries: Mutex::new(Entries {
                hooks: BTreeMap::new(),
                snapshot: None,
            }),
        }
    }

    pub fn add(&self, hook: Arc<H>) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        entries.hooks.insert(id, hook);
        entries.snapshot = None;
        self.len.store(entries.hooks.len(), Ordering::Release);
        HookId(id)
    }

    /// Returns `false` if the hook was never added (or already removed).
    pub fn remove(&self, id: HookId) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.hooks.remove(&id.0).is_some();
        if removed {
            entries.snapshot = None;
            self.len.store(entries.hooks.len(), Ordering::Release);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.hooks.clear();
        entries.snapshot = None;
        self.len.store(0, Ordering::Release);
    }

    fn snapshot(&self) -> Arc<[(HookId, Arc<H>)]> {
        let mut entries = self.entries.lock();
        if let Some(snapshot) = &entries.snapshot {
            return snapshot.clone();
        }
        let built: Arc<[(HookId, Arc<H>)]> = entries
            .hooks
            .iter()
            .map(|(id, hook)| (HookId(*id), hook.clone()))
            .collect::<Vec<_>>()
            .into();
        entries.snapshot = Some(built.clone());
        built
    }

    /// Invoke `f` on every hook, isolating panics per hook.
    pub fn fire<F>(&self, notification: &'static str, sink: Option<&dyn ErrorSink>, f: F)
    where
        F: Fn(&H),
    {
        if self.is_empty() {
            return;
        }
        for (hook_id, hook) in self.snapshot().iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| f(hook.as_ref())));
            if let Err(payload) = outcome {
                let fault = HookFault {
                    category: self.category,
                    notification,
                    hook_id: *hook_id,
                    message: panic_message(payload.as_ref()),
                };
                match sink {
                    Some(sink) => report_to_sink(sink, &fault),
                    None => tracing::warn!(
                        category = %fault.category,
                        notification,
                        message = %fault.message,
                        "devtools hook panicked"
                    ),
                }
            }
        }
    }
}

fn report_to_sink(sink: &dyn ErrorSink, fault: &HookFault) {
    // A faulting sink must not escape either.
    if catch_unwind(AssertUnwindSafe(|| sink.report(fault))).is_err() {
        tracing::warn!(
            category = %fault.category,
            notification = fault.notification,
            "devtools error sink panicked while reporting a hook fault"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The four hook registries plus the optional fault sink.
pub struct HookBus {
    component: HookRegistry<dyn ComponentHook>,
    state: HookRegistry<dyn StateHook>,
    event: HookRegistry<dyn EventHook>,
    performance: HookRegistry<dyn PerformanceHook>,
    error_sink: RwLock<Option<Arc<dyn ErrorSink>>>,
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self {
            component: HookRegistry::new(HookCategory::Component),
            state: HookRegistry::new(HookCategory::State),
            event: HookRegistry::new(HookCategory::Event),
            performance: HookRegistry::new(HookCategory::Performance),
            error_sink: RwLock::new(None),
        }
    }

    pub fn set_error_sink(&self, sink: Option<Arc<dyn ErrorSink>>) {
        *self.error_sink.write() = sink;
    }

    pub fn add_component_hook(&self, hook: Arc<dyn ComponentHook>) -> HookId {
        self.component.add(hook)
    }

    pub fn remove_component_hook(&self, id: HookId) -> bool {
        self.component.remove(id)
    }

    pub fn add_state_hook(&self, hook: Arc<dyn StateHook>) -> HookId {
        self.state.add(hook)
    }

    pub fn remove_state_hook(&self, id: HookId) -> bool {
        self.state.remove(id)
    }

    pub fn add_event_hook(&self, hook: Arc<dyn EventHook>) -> HookId {
        self.event.add(hook)
    }

    pub fn remove_event_hook(&self, id: HookId) -> bool {
        self.event.remove(id)
    }

    pub fn add_performance_hook(&self, hook: Arc<dyn PerformanceHook>) -> HookId {
        self.performance.add(hook)
    }

    pub fn remove_performance_hook(&self, id: HookId) -> bool {
        self.performance.remove(id)
    }

    /// Total hooks across every category.
    pub fn hook_count(&self) -> usize {
        self.component.len() + self.state.len() + self.event.len() + self.performance.len()
    }

    pub fn clear(&self) {
        self.component.clear();
        self.state.clear();
        self.event.clear();
        self.performance.clear();
    }

    fn sink(&self) -> Option<Arc<dyn ErrorSink>> {
        self.error_sink.read().clone()
    }

    pub fn notify_component_created(&self, component: &ComponentInfo) {
        if self.component.is_empty() {
            return;
        }
        let sink = self.sink();
        self.component
            .fire("component_created", sink.as_deref(), |h| {
                h.on_component_created(component)
            });
    }

    pub fn notify_component_mounted(&self, component: &ComponentInfo) {
        if self.component.is_empty() {
            return;
        }
        let sink = self.sink();
        self.component
            .fire("component_mounted", sink.as_deref(), |h| {
                h.on_component_mounted(component)
            });
    }

    pub fn notify_component_updated(&self, component: &ComponentInfo) {
        if self.component.is_empty() {
            return;
        }
        let sink = self.sink();
        self.component
            .fire("component_updated", sink.as_deref(), |h| {
                h.on_component_updated(component)
            });
    }

    pub fn notify_component_unmounted(&self, component_id: &str) {
        if self.component.is_empty() {
            return;
        }
        let sink = self.sink();
        self.component
            .fire("component_unmounted", sink.as_deref(), |h| {
                h.on_component_unmounted(component_id)
            });
    }

    pub fn notify_ref_changed(&self, owner_id: Option<&str>, change: &StateChange) {
        if self.state.is_empty() {
            return;
        }
        let sink = self.sink();
        self.state.fire("ref_changed", sink.as_deref(), |h| {
            h.on_ref_changed(owner_id, change)
        });
    }

    pub fn notify_event(&self, event: &EventRecord) {
        if self.event.is_empty() {
            return;
        }
        let sink = self.sink();
        self.event
            .fire("event", sink.as_deref(), |h| h.on_event(event));
    }

    pub fn notify_command_generated(&self, command: &CommandRecord) {
        if self.event.is_empty() {
            return;
        }
        let sink = self.sink();
        self.event.fire("command_generated", sink.as_deref(), |h| {
            h.on_command_generated(command)
        });
    }

    pub fn notify_render_complete(&self, sample: &RenderSample) {
        if self.performance.is_empty() {
            return;
        }
        let sink = self.sink();
        self.performance
            .fire("render_complete", sink.as_deref(), |h| {
                h.on_render_complete(sample)
            });
    }
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBus")
            .field("component", &self.component.len())
            .field("state", &self.state.len())
            .field("event", &self.event.len())
            .field("performance", &self.performance.len())
            .finish()
    }
}

/// Handle the host framework holds to report lifecycle points.
///
/// A disabled instrumentor (the default) turns every call into a single
/// branch; record construction is skipped entirely.
#[derive(Clone, Default)]
pub struct Instrumentor {
    bus: Option<Arc<HookBus>>,
}

impl Instrumentor {
    pub fn new(bus: Arc<HookBus>) -> Self {
        Self { bus: Some(bus) }
    }

    pub fn disabled() -> Self {
        Self { bus: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    pub fn bus(&self) -> Option<&Arc<HookBus>> {
        self.bus.as_ref()
    }

    pub fn component_created(&self, component: &ComponentInfo) {
        if let Some(bus) = &self.bus {
            bus.notify_component_created(component);
        }
    }

    pub fn component_mounted(&self, component: &ComponentInfo) {
        if let Some(bus) = &self.bus {
            bus.notify_component_mounted(component);
        }
    }

    pub fn component_updated(&self, component: &ComponentInfo) {
        if let Some(bus) = &self.bus {
            bus.notify_component_updated(component);
        }
    }

    pub fn component_unmounted(&self, component_id: &str) {
        if let Some(bus) = &self.bus {
            bus.notify_component_unmounted(component_id);
        }
    }

    pub fn ref_changed<O, N>(
        &self,
        owner_id: Option<&str>,
        ref_id: &str,
        ref_name: &str,
        old_value: O,
        new_value: N,
    ) where
        O: Into<CapturedValue>,
        N: Into<CapturedValue>,
    {
        let Some(bus) = &self.bus else {
            return;
        };
        let change = StateChange::new(ref_id, ref_name, old_value.into(), new_value.into())
            .with_source(owner_id.unwrap_or_default());
        bus.notify_ref_changed(owner_id, &change);
    }

    pub fn event(&self, event: &EventRecord) {
        if let Some(bus) = &self.bus {
            bus.notify_event(event);
        }
    }

    pub fn command_generated(&self, command: &CommandRecord) {
        if let Some(bus) = &self.bus {
            bus.notify_command_generated(command);
        }
    }

    pub fn render_complete(&self, component_id: &str, component_name: &str, duration: Duration) {
        if let Some(bus) = &self.bus {
            bus.notify_render_complete(&RenderSample::new(
                component_id,
                component_name,
                duration,
            ));
        }
    }
}

impl fmt::Debug for Instrumentor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentor")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl EventHook for Recorder {
        fn on_event(&self, event: &EventRecord) {
            self.seen.lock().push(format!("{}:{}", self.label, event.name));
        }
    }

    struct Exploder;

    impl EventHook for Exploder {
        fn on_event(&self, _event: &EventRecord) {
            panic!("hook exploded");
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        faults: Mutex<Vec<HookFault>>,
    }

    impl ErrorSink for CollectingSink {
        fn report(&self, fault: &HookFault) {
            self.faults.lock().push(fault.clone());
        }
    }

    fn click() -> EventRecord {
        EventRecord::new("click", "button", CapturedValue::Null)
    }

    #[test]
    fn fires_in_registration_order() {
        let bus = HookBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            bus.add_event_hook(Arc::new(Recorder {
                label,
                seen: seen.clone(),
            }));
        }

        bus.notify_event(&click());
        assert_eq!(
            *seen.lock(),
            vec!["first:click", "second:click", "third:click"]
        );
    }

    #[test]
    fn panicking_hook_does_not_stop_the_others() {
        let bus = HookBus::new();
        let sink = Arc::new(CollectingSink::default());
        bus.set_error_sink(Some(sink.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.add_event_hook(Arc::new(Recorder {
            label: "before",
            seen: seen.clone(),
        }));
        let bad = bus.add_event_hook(Arc::new(Exploder));
        bus.add_event_hook(Arc::new(Recorder {
            label: "after",
            seen: seen.clone(),
        }));

        bus.notify_event(&click());

        assert_eq!(*seen.lock(), vec!["before:click", "after:click"]);
        let faults = sink.faults.lock();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].hook_id, bad);
        assert_eq!(faults[0].category, HookCategory::Event);
        assert_eq!(faults[0].notification, "event");
        assert!(faults[0].message.contains("hook exploded"));
    }

    #[test]
    fn remove_is_a_no_op_for_unknown_ids() {
        let bus = HookBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = bus.add_event_hook(Arc::new(Recorder {
            label: "only",
            seen: seen.clone(),
        }));

        assert!(bus.remove_event_hook(id));
        assert!(!bus.remove_event_hook(id));
        bus.notify_event(&click());
        assert!(seen.lock().is_empty());
        assert_eq!(bus.hook_count(), 0);
    }

    #[test]
    fn disabled_instrumentor_is_a_no_op() {
        let instrumentor = Instrumentor::disabled();
        assert!(!instrumentor.is_enabled());
        instrumentor.ref_changed(None, "ref", "count", 1, 2);
        instrumentor.render_complete("c", "C", Duration::from_millis(1));
    }

    #[test]
    fn concurrent_add_remove_and_fire() {
        let bus = Arc::new(HookBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                let seen = seen.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let id = bus.add_event_hook(Arc::new(Recorder {
                            label: "t",
                            seen: seen.clone(),
                        }));
                        bus.notify_event(&click());
                        bus.remove_event_hook(id);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(bus.hook_count(), 0);
        // Every fire saw at least the hook its own thread registered.
        assert!(seen.lock().len() >= 400);
    }
}
