//! Component graph indices.
//!
//! Four indices are kept together and always mutated as a unit by the owning
//! [`Store`](super::Store), which holds them behind one lock:
//! - `components`: latest snapshot per component ID
//! - `ref_owners`: ref ID -> owning component ID
//! - `children`: parent ID -> ordered child IDs
//! - `parents`: child ID -> parent ID
//!
//! A snapshot's `children` field lists exactly the indexed children whose
//! snapshots exist. Edges recorded before both endpoints exist live only in
//! the adjacency index until the missing snapshot is added, at which point
//! both sides are reconciled.

use std::collections::{HashMap, HashSet};

use crate::model::{ComponentSnapshot, ComponentTree, ParentRef, RefSnapshot};
use crate::value::CapturedValue;

#[derive(Debug, Default)]
pub(crate) struct ComponentGraph {
    components: HashMap<String, ComponentSnapshot>,
    /// Component IDs in first-insertion order.
    order: Vec<String>,
    ref_owners: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
}

impl ComponentGraph {
    pub fn upsert(&mut self, mut snapshot: ComponentSnapshot) {
        let id = snapshot.id.clone();

        // Carry over refs registered for this component that the incoming
        // snapshot does not mention, so owned refs never disappear.
        let previous = self.components.remove(&id);
        let owned: Vec<String> = self
            .ref_owners
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(ref_id, _)| ref_id.clone())
            .collect();
        for ref_id in owned {
            if snapshot.find_ref(&ref_id).is_some() {
                continue;
            }
            let carried = previous
                .as_ref()
                .and_then(|prev| prev.find_ref(&ref_id).cloned())
                .unwrap_or_else(|| RefSnapshot::placeholder(ref_id.as_str()));
            snapshot.refs.push(carried);
        }

        snapshot.children = self.existing_children(&id);
        snapshot.parent = self.parents.get(&id).map(|parent_id| ParentRef {
            id: parent_id.clone(),
            name: self
                .components
                .get(parent_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| parent_id.clone()),
        });

        if previous.is_none() {
            self.order.push(id.clone());
        }
        let name = snapshot.name.clone();
        self.components.insert(id.clone(), snapshot);

        // Reconcile lagging edges on both sides of the new snapshot.
        if let Some(parent_id) = self.parents.get(&id).cloned() {
            let refreshed = self.existing_children(&parent_id);
            if let Some(parent) = self.components.get_mut(&parent_id) {
                parent.children = refreshed;
            }
        }
        if let Some(child_ids) = self.children.get(&id) {
            for child_id in child_ids {
                if let Some(child) = self.components.get_mut(child_id) {
                    child.parent = Some(ParentRef {
                        id: id.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let existed = self.components.remove(id).is_some();

        self.order.retain(|c| c != id);
        self.ref_owners.retain(|_, owner| owner != id);

        if let Some(child_ids) = self.children.remove(id) {
            for child_id in child_ids {
                self.parents.remove(&child_id);
                if let Some(child) = self.components.get_mut(&child_id) {
                    child.parent = None;
                }
            }
        }

        if let Some(parent_id) = self.parents.remove(id) {
            if let Some(siblings) = self.children.get_mut(&parent_id) {
                siblings.retain(|c| c != id);
                if siblings.is_empty() {
                    self.children.remove(&parent_id);
                }
            }
            if let Some(parent) = self.components.get_mut(&parent_id) {
                parent.children.retain(|c| c != id);
            }
        }

        existed
    }

    pub fn get(&self, id: &str) -> Option<&ComponentSnapshot> {
        self.components.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ComponentSnapshot> {
        self.components.get_mut(id)
    }

    /// Returns `true` when the pair was newly registered.
    pub fn register_ref_owner(&mut self, component_id: &str, ref_id: &str) -> bool {
        match self.ref_owners.get(ref_id) {
            Some(owner) if owner == component_id => return false,
            Some(owner) => {
                tracing::debug!(
                    ref_id,
                    owner = %owner,
                    rejected = component_id,
                    "ref already has an owner"
                );
                return false;
            }
            None => {}
        }

        self.ref_owners
            .insert(ref_id.to_string(), component_id.to_string());
        if let Some(owner) = self.components.get_mut(component_id) {
            if owner.find_ref(ref_id).is_none() {
                owner.refs.push(RefSnapshot::placeholder(ref_id));
            }
        }
        true
    }

    pub fn ref_owner(&self, ref_id: &str) -> Option<&str> {
        self.ref_owners.get(ref_id).map(String::as_str)
    }

    /// Write `value` into the owner's ref entry and mirror it into its state.
    ///
    /// Returns `("", false)` for unregistered refs, and `(owner, false)` when
    /// the owner is known but its snapshot has not arrived yet.
    pub fn update_ref(
        &mut self,
        ref_id: &str,
        ref_name: Option<&str>,
        value: CapturedValue,
    ) -> (String, bool) {
        let Some(owner_id) = self.ref_owners.get(ref_id).cloned() else {
            return (String::new(), false);
        };
        let Some(owner) = self.components.get_mut(&owner_id) else {
            return (owner_id, false);
        };

        let type_tag = value.type_tag().to_string();
        let name = match owner.refs.iter_mut().find(|r| r.id == ref_id) {
            Some(entry) => {
                if let Some(name) = ref_name.filter(|n| !n.is_empty()) {
                    entry.name = name.to_string();
                }
                entry.type_tag = type_tag;
                entry.value = value.clone();
                entry.name.clone()
            }
            None => {
                let name = ref_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or(ref_id)
                    .to_string();
                let mut entry = RefSnapshot::new(ref_id, name.as_str(), value.clone());
                entry.type_tag = type_tag;
                owner.refs.push(entry);
                name
            }
        };
        owner.state.insert(name, value);
        (owner_id, true)
    }

    /// Returns `true` when the edge was newly added.
    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        if parent_id == child_id {
            return false;
        }
        match self.parents.get(child_id) {
            Some(existing) if existing == parent_id => return false,
            Some(existing) => {
                // A component has at most one parent: detach from the old one.
                let existing = existing.clone();
                self.detach(&existing, child_id);
            }
            None => {}
        }

        self.children
            .entry(parent_id.to_string())
            .or_default()
            .push(child_id.to_string());
        self.parents
            .insert(child_id.to_string(), parent_id.to_string());

        if self.components.contains_key(parent_id) && self.components.contains_key(child_id) {
            let parent_name = self
                .components
                .get_mut(parent_id)
                .map(|parent| {
                    parent.children.push(child_id.to_string());
                    parent.name.clone()
                })
                .unwrap_or_default();
            if let Some(child) = self.components.get_mut(child_id) {
                child.parent = Some(ParentRef {
                    id: parent_id.to_string(),
                    name: parent_name,
                });
            }
        } else {
            tracing::debug!(
                parent_id,
                child_id,
                "edge recorded before both snapshots exist; children reconcile on upsert"
            );
        }
        true
    }

    /// Returns `true` when an edge was removed.
    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        if self.parents.get(child_id).map(String::as_str) != Some(parent_id) {
            return false;
        }
        self.detach(parent_id, child_id);
        true
    }

    fn detach(&mut self, parent_id: &str, child_id: &str) {
        self.parents.remove(child_id);
        if let Some(siblings) = self.children.get_mut(parent_id) {
            siblings.retain(|c| c != child_id);
            if siblings.is_empty() {
                self.children.remove(parent_id);
            }
        }
        if let Some(parent) = self.components.get_mut(parent_id) {
            parent.children.retain(|c| c != child_id);
        }
        if let Some(child) = self.components.get_mut(child_id) {
            child.parent = None;
        }
    }

    fn existing_children(&self, id: &str) -> Vec<String> {
        self.children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter(|c| self.components.contains_key(*c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Child IDs from the adjacency index, including children whose
    /// snapshots have not arrived.
    pub fn child_ids(&self, id: &str) -> Vec<String> {
        self.children.get(id).cloned().unwrap_or_default()
    }

    pub fn children_of(&self, id: &str) -> Vec<ComponentSnapshot> {
        self.children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|c| self.components.get(c).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn roots(&self) -> Vec<ComponentSnapshot> {
        self.ordered()
            .filter(|c| !self.parents.contains_key(&c.id))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ComponentSnapshot> {
        self.ordered().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn tree(&self, id: &str) -> Option<ComponentTree> {
        let mut visited = HashSet::new();
        self.build_tree(id, &mut visited)
    }

    fn build_tree(&self, id: &str, visited: &mut HashSet<String>) -> Option<ComponentTree> {
        if !visited.insert(id.to_string()) {
            return None;
        }
        let snapshot = self.components.get(id)?.clone();
        let children = snapshot
            .children
            .iter()
            .filter_map(|child| self.build_tree(child, visited))
            .collect();
        Some(ComponentTree { snapshot, children })
    }

    pub fn clear(&mut self) {
        self.components.clear();
        self.order.clear();
        self.ref_owners.clear();
        self.children.clear();
        self.parents.clear();
    }

    fn ordered(&self) -> impl Iterator<Item = &ComponentSnapshot> {
        self.order.iter().filter_map(|id| self.components.get(id))
    }
}
