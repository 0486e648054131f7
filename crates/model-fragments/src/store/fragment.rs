use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, Owner, OwnerLink};
use crate::state::FragmentState;
use crate::value::AttrValue;

use super::attributes::ChangedAttributes;
use super::transform::{invalid_payload, Origin, Version};
use super::Store;

impl Store {
    /// Builds an unowned fragment of `model` in `loaded.created` state.
    ///
    /// Declared defaults become committed data and `attributes` (an object or
    /// `null`) is applied on top as pending assignments. Keys outside the
    /// schema fail with [`FragmentError::UnknownAttribute`].
    pub fn create_fragment(&mut self, model: &str, attributes: &Value) -> Result<NodeId> {
        let concrete = self
            .registry
            .get(model)
            .is_some_and(|schema| schema.is_fragment() && !schema.is_abstract);
        if !concrete {
            return Err(FragmentError::InvalidFragmentType(model.to_string()));
        }
        let payload = object_or_empty(model, attributes)?;
        let out = self.atomically(|store| {
            store.create_local_fragment(model, &payload, &Default::default())
        });
        if let Ok(id) = &out {
            debug!(node = %id, model, "fragment created");
        }
        self.finish(out)
    }
}

pub(crate) fn object_or_empty(name: &str, value: &Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(invalid_payload(name, format!("expected an object, got {other}"))),
    }
}

/// Mutable view of one fragment.
pub struct FragmentHandle<'a> {
    store: &'a mut Store,
    id: NodeId,
}

impl<'a> FragmentHandle<'a> {
    pub(crate) fn new(store: &'a mut Store, id: NodeId) -> Self {
        Self { store, id }
    }

    fn owner(&self) -> Owner {
        Owner::Fragment(self.id)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn model(&self) -> Result<&str> {
        Ok(&self.store.fragment_node(self.id)?.model)
    }

    pub fn state(&self) -> Result<FragmentState> {
        Ok(self.store.fragment_node(self.id)?.state)
    }

    pub fn link(&self) -> Result<Option<&OwnerLink>> {
        Ok(self.store.fragment_node(self.id)?.link.as_ref())
    }

    pub fn get(&self, key: &str) -> Result<AttrValue> {
        self.store.owner_get(self.owner(), key)
    }

    pub fn get_json(&self, key: &str) -> Result<Value> {
        self.store.owner_get_json(self.owner(), key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        let owner = self.owner();
        let out = self.store.owner_set(owner, key, value.into());
        self.store.finish(out)
    }

    pub fn set_json(&mut self, key: &str, raw: &Value) -> Result<()> {
        let owner = self.owner();
        let out = self
            .store
            .atomically(|store| store.owner_set_json(owner, key, raw));
        self.store.finish(out)
    }

    pub fn is_dirty(&self) -> bool {
        self.store.node_is_dirty(self.id)
    }

    pub fn is_new(&self) -> Result<bool> {
        Ok(self.state()?.is_new())
    }

    pub fn changed_attributes(&self) -> Result<ChangedAttributes> {
        self.store.changed_attributes(self.owner())
    }

    /// Discards every uncommitted change in this fragment and below it.
    pub fn rollback(&mut self) -> Result<()> {
        let out = self.store.rollback_subtree(self.id);
        self.store.finish(out)
    }

    /// Current values as JSON. The discriminator is included when the
    /// fragment sits under a polymorphic attribute.
    pub fn serialize(&self) -> Result<Value> {
        let type_key = self.store.fragment_type_key(self.id)?;
        self.store
            .serialize_fragment(self.id, type_key.as_deref(), Version::Current)
    }

    /// Unowned deep copy in `loaded.created` state.
    pub fn copy(&mut self) -> Result<NodeId> {
        let id = self.id;
        let out = self.store.atomically(|store| {
            store.silently(|store| store.copy_node(id, Origin::Local))
        });
        self.store.finish(out)
    }
}
