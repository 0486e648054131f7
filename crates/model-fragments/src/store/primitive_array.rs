use model_fragments_schema::Scalar;
use serde_json::Value;

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, OwnerLink};

use super::transform::{deserialize_items, invalid_payload, Origin, Version};
use super::Store;

impl Store {
    fn normalize_items(&self, arr: NodeId, values: Vec<Scalar>) -> Result<Vec<Scalar>> {
        let item = self.primitive_array_node(arr)?.item;
        match item {
            Some(transform) => values
                .into_iter()
                .map(|value| transform.normalize(value).map_err(FragmentError::from))
                .collect(),
            None => Ok(values),
        }
    }

    pub(crate) fn primitive_splice(
        &mut self,
        arr: NodeId,
        start: usize,
        delete_count: usize,
        values: Vec<Scalar>,
    ) -> Result<Vec<Scalar>> {
        let values = self.normalize_items(arr, values)?;
        let removed = self
            .primitive_array_node_mut(arr)?
            .items
            .replace(start, delete_count, values)?;
        self.array_did_change(arr)?;
        Ok(removed)
    }

    pub(crate) fn primitive_set_objects(&mut self, arr: NodeId, values: Vec<Scalar>) -> Result<()> {
        let values = self.normalize_items(arr, values)?;
        self.primitive_array_node_mut(arr)?
            .items
            .set_objects(values);
        self.array_did_change(arr)
    }
}

/// Mutable view of one primitive array.
pub struct ArrayHandle<'a> {
    store: &'a mut Store,
    id: NodeId,
}

impl<'a> ArrayHandle<'a> {
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

    pub fn link(&self) -> Result<Option<&OwnerLink>> {
        Ok(self.store.primitive_array_node(self.id)?.link.as_ref())
    }

    pub fn values(&self) -> Result<Vec<Scalar>> {
        Ok(self.store.primitive_array_node(self.id)?.items.current.clone())
    }

    pub fn get(&self, index: usize) -> Result<Option<Scalar>> {
        Ok(self
            .store
            .primitive_array_node(self.id)?
            .items
            .get(index)
            .cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.store.primitive_array_node(self.id)?.items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_dirty(&self) -> bool {
        self.store.node_is_dirty(self.id)
    }

    /// Replaces both the contents and the committed snapshot. The owner is
    /// only told when this clears pending changes.
    pub fn setup_data(&mut self, values: Vec<Scalar>) -> Result<()> {
        self.run(|store, arr| {
            let values = store.normalize_items(arr, values)?;
            let node = store.primitive_array_node_mut(arr)?;
            node.items.original = values.clone();
            node.items.current = values;
            store.array_did_change(arr)
        })
    }

    pub fn push(&mut self, value: impl Into<Scalar>) -> Result<()> {
        let value = value.into();
        self.run(|store, arr| {
            let len = store.primitive_array_node(arr)?.items.len();
            store.primitive_splice(arr, len, 0, vec![value])?;
            Ok(())
        })
    }

    pub fn insert_at(&mut self, index: usize, value: impl Into<Scalar>) -> Result<()> {
        let value = value.into();
        self.run(|store, arr| {
            store.primitive_splice(arr, index, 0, vec![value])?;
            Ok(())
        })
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Scalar> {
        self.run(|store, arr| {
            let len = store.primitive_array_node(arr)?.items.len();
            if index >= len {
                return Err(FragmentError::IndexOutOfBounds { index, len });
            }
            store
                .primitive_splice(arr, index, 1, Vec::new())?
                .into_iter()
                .next()
                .ok_or(FragmentError::IndexOutOfBounds { index, len })
        })
    }

    /// Removes the first element equal to `value`. Returns whether one was
    /// found.
    pub fn remove_value(&mut self, value: impl Into<Scalar>) -> Result<bool> {
        let value = value.into();
        self.run(|store, arr| {
            let Some(index) = store.primitive_array_node(arr)?.items.position(&value) else {
                return Ok(false);
            };
            store.primitive_splice(arr, index, 1, Vec::new())?;
            Ok(true)
        })
    }

    pub fn replace(
        &mut self,
        start: usize,
        delete_count: usize,
        values: Vec<Scalar>,
    ) -> Result<Vec<Scalar>> {
        self.run(|store, arr| store.primitive_splice(arr, start, delete_count, values))
    }

    pub fn set_objects(&mut self, values: Vec<Scalar>) -> Result<()> {
        self.run(|store, arr| store.primitive_set_objects(arr, values))
    }

    /// Replaces the contents from a JSON array, read through the item
    /// transform.
    pub fn set_json(&mut self, values: &Value) -> Result<()> {
        let Some(items) = values.as_array() else {
            return Err(invalid_payload(
                "array",
                format!("expected an array, got {values}"),
            ));
        };
        self.run(|store, arr| {
            let item = store.primitive_array_node(arr)?.item;
            let values = deserialize_items(item, items)?;
            store.primitive_set_objects(arr, values)
        })
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.run(|store, arr| {
            store
                .primitive_array_node_mut(arr)?
                .items
                .move_item(from, to)?;
            store.array_did_change(arr)
        })
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.run(|store, arr| store.rollback_subtree(arr))
    }

    pub fn serialize(&self) -> Result<Value> {
        self.store.serialize_primitive_array(self.id, Version::Current)
    }

    pub fn copy(&mut self) -> Result<NodeId> {
        self.run(|store, arr| store.copy_node(arr, Origin::Pushed))
    }
}
