use serde_json::Value;

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, OwnerLink};

use super::fragment::object_or_empty;
use super::transform::{invalid_payload, Origin, Version};
use super::Store;

impl Store {
    /// Type and ownership checks for fragments about to join `arr`. An
    /// unowned array only takes unowned fragments.
    fn check_members(&self, arr: NodeId, members: &[NodeId]) -> Result<()> {
        let node = self.fragment_array_node(arr)?;
        for &member in members {
            self.check_fragment_type(&node.model, member)?;
            match &node.link {
                Some(link) => self.check_attach(member, link)?,
                None => {
                    if let Some(existing) = self.node(member)?.link() {
                        return Err(FragmentError::OwnershipConflict {
                            existing: existing.clone(),
                            requested: None,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn adopt_members(&mut self, arr: NodeId, members: &[NodeId]) -> Result<()> {
        if let Some(link) = self.fragment_array_node(arr)?.link.clone() {
            for &member in members {
                self.node_mut(member)?.set_link(Some(link.clone()));
            }
        }
        Ok(())
    }

    pub(crate) fn fragment_array_splice(
        &mut self,
        arr: NodeId,
        start: usize,
        delete_count: usize,
        members: Vec<NodeId>,
    ) -> Result<Vec<NodeId>> {
        let len = self.fragment_array_node(arr)?.items.len();
        if start > len {
            return Err(FragmentError::IndexOutOfBounds { index: start, len });
        }
        self.check_members(arr, &members)?;
        self.adopt_members(arr, &members)?;
        let removed = self
            .fragment_array_node_mut(arr)?
            .items
            .replace(start, delete_count, members)?;
        self.array_did_change(arr)?;
        Ok(removed)
    }

    pub(crate) fn fragment_array_set_objects(
        &mut self,
        arr: NodeId,
        members: Vec<NodeId>,
    ) -> Result<()> {
        self.check_members(arr, &members)?;
        self.adopt_members(arr, &members)?;
        self.fragment_array_node_mut(arr)?
            .items
            .set_objects(members);
        self.array_did_change(arr)
    }
}

/// Mutable view of one fragment array.
///
/// Every structural change re-derives the array's dirtiness; the owner is
/// only told when that flips.
pub struct FragmentArrayHandle<'a> {
    store: &'a mut Store,
    id: NodeId,
}

impl<'a> FragmentArrayHandle<'a> {
    pub(crate) fn new(store: &'a mut Store, id: NodeId) -> Self {
        Self { store, id }
    }

    fn run<T>(&mut self, op: impl FnOnce(&mut Store, NodeId) -> Result<T>) -> Result<T> {
        let out = op(&mut *self.store, self.id);
        self.store.finish(out)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Declared member model.
    pub fn model(&self) -> Result<&str> {
        Ok(&self.store.fragment_array_node(self.id)?.model)
    }

    pub fn link(&self) -> Result<Option<&OwnerLink>> {
        Ok(self.store.fragment_array_node(self.id)?.link.as_ref())
    }

    pub fn members(&self) -> Result<Vec<NodeId>> {
        Ok(self.store.fragment_array_node(self.id)?.items.current.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.store.fragment_array_node(self.id)?.items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn fragment_at(&self, index: usize) -> Result<Option<NodeId>> {
        Ok(self
            .store
            .fragment_array_node(self.id)?
            .items
            .get(index)
            .copied())
    }

    pub fn is_dirty(&self) -> bool {
        self.store.node_is_dirty(self.id)
    }

    /// Appends `fragment`. Adding a current member again does nothing.
    pub fn add_fragment(&mut self, fragment: NodeId) -> Result<()> {
        self.run(|store, arr| {
            let items = &store.fragment_array_node(arr)?.items;
            if items.position(&fragment).is_some() {
                return Ok(());
            }
            let len = items.len();
            store.fragment_array_splice(arr, len, 0, vec![fragment])?;
            Ok(())
        })
    }

    pub fn insert_fragment_at(&mut self, index: usize, fragment: NodeId) -> Result<()> {
        self.run(|store, arr| {
            store.fragment_array_splice(arr, index, 0, vec![fragment])?;
            Ok(())
        })
    }

    /// Builds a `loaded.created` member from `attributes` and appends it.
    /// For a polymorphic array the discriminator in `attributes` picks the
    /// variant.
    pub fn create_fragment(&mut self, attributes: &Value) -> Result<NodeId> {
        self.run(|store, arr| {
            let node = store.fragment_array_node(arr)?;
            let declared = node.model.clone();
            let options = node.options.clone();
            let payload = object_or_empty(&declared, attributes)?;
            store.atomically(|store| {
                let model = store.resolve_payload_model(&declared, &options, &payload)?;
                let fragment = store.create_local_fragment(&model, &payload, &options)?;
                let len = store.fragment_array_node(arr)?.items.len();
                store.fragment_array_splice(arr, len, 0, vec![fragment])?;
                Ok(fragment)
            })
        })
    }

    /// Hydrates an object literal as a new `loaded.created` member. Keys the
    /// schema does not know are skipped.
    pub fn add_json(&mut self, object: &Value) -> Result<NodeId> {
        self.run(|store, arr| {
            let node = store.fragment_array_node(arr)?;
            let declared = node.model.clone();
            let options = node.options.clone();
            let payload = object
                .as_object()
                .ok_or_else(|| invalid_payload(&declared, "expected an object"))?;
            store.atomically(|store| {
                let model = store.resolve_payload_model(&declared, &options, payload)?;
                let fragment =
                    store.silently(|store| store.hydrate_fragment(&model, payload, Origin::Local))?;
                let len = store.fragment_array_node(arr)?.items.len();
                store.fragment_array_splice(arr, len, 0, vec![fragment])?;
                Ok(fragment)
            })
        })
    }

    /// Removes the first occurrence of `fragment`.
    pub fn remove_fragment(&mut self, fragment: NodeId) -> Result<()> {
        self.run(|store, arr| {
            let index = store
                .fragment_array_node(arr)?
                .items
                .position(&fragment)
                .ok_or(FragmentError::NotAMember(fragment))?;
            store.fragment_array_splice(arr, index, 1, Vec::new())?;
            Ok(())
        })
    }

    pub fn remove_at(&mut self, index: usize) -> Result<NodeId> {
        self.run(|store, arr| {
            let len = store.fragment_array_node(arr)?.items.len();
            if index >= len {
                return Err(FragmentError::IndexOutOfBounds { index, len });
            }
            let removed = store.fragment_array_splice(arr, index, 1, Vec::new())?;
            removed
                .first()
                .copied()
                .ok_or(FragmentError::IndexOutOfBounds { index, len })
        })
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.run(|store, arr| {
            store
                .fragment_array_node_mut(arr)?
                .items
                .move_item(from, to)?;
            store.array_did_change(arr)
        })
    }

    /// `splice`: removes `delete_count` members at `start`, inserts
    /// `fragments` there and returns the removed members.
    pub fn replace(
        &mut self,
        start: usize,
        delete_count: usize,
        fragments: Vec<NodeId>,
    ) -> Result<Vec<NodeId>> {
        self.run(|store, arr| store.fragment_array_splice(arr, start, delete_count, fragments))
    }

    pub fn set_objects(&mut self, fragments: Vec<NodeId>) -> Result<()> {
        self.run(|store, arr| store.fragment_array_set_objects(arr, fragments))
    }

    /// Replaces the contents from an array of object literals, updating
    /// members in place index by index when their type matches.
    pub fn set_json(&mut self, items: &Value) -> Result<()> {
        let Some(items) = items.as_array() else {
            return Err(invalid_payload(
                "fragment array",
                format!("expected an array, got {items}"),
            ));
        };
        self.run(|store, arr| store.atomically(|store| store.fragment_array_set_json(arr, items)))
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.run(|store, arr| store.rollback_subtree(arr))
    }

    pub fn serialize(&self) -> Result<Value> {
        self.store.serialize_fragment_array(self.id, Version::Current)
    }

    /// Unowned deep copy; the copied members are clean.
    pub fn copy(&mut self) -> Result<NodeId> {
        self.run(|store, arr| {
            store.atomically(|store| store.silently(|store| store.copy_node(arr, Origin::Pushed)))
        })
    }
}
