//! Hook implementations that feed notifications into a [`Store`].

use std::sync::Arc;

use chrono::Utc;

use crate::hooks::{ComponentHook, ComponentInfo, EventHook, PerformanceHook, StateHook};
use crate::model::{
    CommandRecord, ComponentSnapshot, ComponentStatus, EventRecord, RenderSample, StateChange,
};
use crate::store::Store;

/// Registered on every hook category by [`crate::DevTools`].
#[derive(Clone)]
pub struct StoreHooks {
    store: Arc<Store>,
}

impl StoreHooks {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn upsert(&self, component: &ComponentInfo, status: ComponentStatus) {
        let existed = self.store.update_component(&component.id, |snapshot| {
            snapshot.name = component.name.clone();
            snapshot.component_type = component.component_type.clone();
            snapshot.props = component.props.clone();
            snapshot.status = status;
            snapshot.timestamp = Utc::now();
        });
        if !existed {
            let snapshot = ComponentSnapshot::new(component.id.as_str(), component.name.as_str())
                .with_type(component.component_type.as_str())
                .with_props(component.props.clone())
                .with_status(status);
            self.store.add_component(snapshot);
        }

        for info in &component.refs {
            self.store.register_ref_owner(&component.id, &info.id);
            match &info.value {
                Some(value) => {
                    self.store
                        .update_named_ref_value(&info.id, &info.name, value.clone());
                }
                None => {
                    self.store.update_component(&component.id, |snapshot| {
                        if let Some(entry) = snapshot.refs.iter_mut().find(|r| r.id == info.id) {
                            entry.name = info.name.clone();
                        }
                    });
                }
            }
            self.store.update_component(&component.id, |snapshot| {
                if let Some(entry) = snapshot.refs.iter_mut().find(|r| r.id == info.id) {
                    entry.watchers = info.watchers;
                }
            });
        }

        if let Some(parent_id) = &component.parent_id {
            self.store.add_component_child(parent_id, &component.id);
        }
    }
}

impl ComponentHook for StoreHooks {
    fn on_component_created(&self, component: &ComponentInfo) {
        self.upsert(component, ComponentStatus::Created);
    }

    fn on_component_mounted(&self, component: &ComponentInfo) {
        self.upsert(component, ComponentStatus::Mounted);
    }

    fn on_component_updated(&self, component: &ComponentInfo) {
        self.upsert(component, ComponentStatus::Updated);
    }

    fn on_component_unmounted(&self, component_id: &str) {
        if !self.store.mark_unmounted(component_id) {
            tracing::debug!(component_id, "unmount for unknown component");
        }
    }
}

impl StateHook for StoreHooks {
    fn on_ref_changed(&self, owner_id: Option<&str>, change: &StateChange) {
        if let Some(owner_id) = owner_id {
            self.store.register_ref_owner(owner_id, &change.ref_id);
        }
        self.store.update_named_ref_value(
            &change.ref_id,
            &change.ref_name,
            change.new_value.clone(),
        );
        self.store.record_state_change(change.clone());
    }
}

impl EventHook for StoreHooks {
    fn on_event(&self, event: &EventRecord) {
        self.store.record_event(event.clone());
    }

    fn on_command_generated(&self, command: &CommandRecord) {
        self.store.record_command(command.clone());
    }
}

impl PerformanceHook for StoreHooks {
    fn on_render_complete(&self, sample: &RenderSample) {
        self.store.record_render(sample);
    }
}
