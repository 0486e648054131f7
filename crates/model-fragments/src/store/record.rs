//! Top-level records and the save protocol.
//!
//! ```text
//! create_record ──► New ──will_commit──► InFlight ──did_commit──► Saved
//!                                          │                       ▲ │
//!                                    commit_failed            reset│ │dirty
//!                                          ▼                       │ ▼
//!                               New / Saved / Updated ◄────────► Updated
//! ```

use model_fragments_schema::{AttributeDef, ModelSchema};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, Owner, RecordId};
use crate::nodes::AttrTable;
use crate::record::{RecordNode, RecordState};
use crate::snapshot::{Snapshot, SnapshotValue};
use crate::value::AttrValue;

use super::attributes::ChangedAttributes;
use super::fragment::object_or_empty;
use super::transform::{invalid_payload, Version};
use super::Store;

impl Store {
    fn record_schema(&self, model: &str) -> Result<&ModelSchema> {
        self.registry
            .get(model)
            .filter(|schema| !schema.is_fragment())
            .ok_or_else(|| FragmentError::InvalidRecordType(model.to_string()))
    }

    /// Creates a never-saved record. Defaults are committed data; the keys
    /// of `attributes` are applied on top as pending assignments.
    pub fn create_record(&mut self, model: &str, attributes: &Value) -> Result<RecordId> {
        let defs: Vec<AttributeDef> = self
            .record_schema(model)?
            .attributes
            .values()
            .cloned()
            .collect();
        let payload = object_or_empty(model, attributes)?;
        let out = self.atomically(|store| {
            let id = store.alloc_record(RecordNode {
                model: model.to_string(),
                id: None,
                state: RecordState::New,
                dirty_before_save: false,
                attrs: AttrTable::default(),
            });
            let owner = Owner::Record(id);
            store.silently(|store| store.hydrate_attributes(owner, &defs, &Map::new()))?;
            for (key, raw) in &payload {
                store.owner_set_json(owner, key, raw)?;
            }
            Ok(id)
        });
        if let Ok(id) = &out {
            debug!(record = %id, model, "record created");
        }
        self.finish(out)
    }

    /// Loads server data for `model`/`id`. A record already known under that
    /// id is updated in place: its committed data is replaced key by key and
    /// nested fragments of the same type are reused.
    pub fn push_record(&mut self, model: &str, id: &str, payload: &Value) -> Result<RecordId> {
        let defs: Vec<AttributeDef> = self
            .record_schema(model)?
            .attributes
            .values()
            .cloned()
            .collect();
        let payload = object_or_empty(model, payload)?;
        let out = match self.find_record(model, id) {
            Some(existing) => self.atomically(|store| {
                let owner = Owner::Record(existing);
                store.silently(|store| store.push_attributes(owner, &payload))?;
                let dirty = store.owner_has_dirty_keys(owner);
                let record = store.record_node_mut(existing)?;
                record.state = match record.state {
                    RecordState::Saved | RecordState::Updated if dirty => RecordState::Updated,
                    RecordState::Saved | RecordState::Updated => RecordState::Saved,
                    other => other,
                };
                debug!(record = %existing, model, id, "record updated from push");
                Ok(existing)
            }),
            None => self.atomically(|store| {
                let record = store.alloc_record(RecordNode {
                    model: model.to_string(),
                    id: Some(id.to_string()),
                    state: RecordState::Saved,
                    dirty_before_save: false,
                    attrs: AttrTable::default(),
                });
                store.silently(|store| {
                    store.hydrate_attributes(Owner::Record(record), &defs, &payload)
                })?;
                store
                    .identity
                    .insert((model.to_string(), id.to_string()), record);
                debug!(%record, model, id, "record loaded");
                Ok(record)
            }),
        };
        self.finish(out)
    }

    fn record_has_dirty_attributes(&self, id: RecordId) -> Result<bool> {
        let record = self.record_node(id)?;
        Ok(match record.state {
            RecordState::New | RecordState::Updated => true,
            RecordState::InFlight { .. } => record.dirty_before_save,
            RecordState::Saved | RecordState::Deleted => false,
        })
    }

    fn will_commit(&mut self, id: RecordId) -> Result<Value> {
        let state = self.record_node(id)?.state;
        let was_new = match state {
            RecordState::New => true,
            RecordState::Saved | RecordState::Updated => false,
            other => {
                return Err(FragmentError::InvalidRecordState {
                    state: other,
                    action: "save",
                })
            }
        };
        let payload = self.serialize_attributes(Owner::Record(id), Version::Current)?;
        let dirty = self.record_has_dirty_attributes(id)?;
        let record = self.record_node_mut(id)?;
        record.state = RecordState::InFlight { was_new };
        record.dirty_before_save = dirty;
        debug!(record = %id, was_new, "save started");
        Ok(Value::Object(payload))
    }

    fn did_commit(&mut self, id: RecordId, payload: Option<&Value>) -> Result<()> {
        let record = self.record_node(id)?;
        if !record.state.is_saving() {
            return Err(FragmentError::InvalidRecordState {
                state: record.state,
                action: "commit",
            });
        }
        let model = record.model.clone();
        let mut payload = match payload {
            Some(value) => object_or_empty(&model, value)?,
            None => Map::new(),
        };
        let server_id = match payload.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value),
            Some(Value::Number(value)) => Some(value.to_string()),
            Some(other) => return Err(invalid_payload("id", format!("unusable id {other}"))),
        };
        self.atomically(|store| {
            let owner = Owner::Record(id);
            let mut released = Vec::new();
            store.silently(|store| {
                store.commit_owner(owner, &mut released)?;
                store.push_attributes(owner, &payload)
            })?;
            store.release_nodes(id, released)?;
            if let Some(server_id) = server_id {
                store.assign_record_id(id, &model, server_id)?;
            }
            let record = store.record_node_mut(id)?;
            record.state = RecordState::Saved;
            record.dirty_before_save = false;
            debug!(record = %id, "save committed");
            Ok(())
        })
    }

    fn assign_record_id(&mut self, id: RecordId, model: &str, server_id: String) -> Result<()> {
        let key = (model.to_string(), server_id.clone());
        if let Some(&other) = self.identity.get(&key) {
            if other != id {
                return Err(FragmentError::DuplicateRecord {
                    model: model.to_string(),
                    id: server_id,
                });
            }
        }
        let record = self.record_node_mut(id)?;
        if let Some(previous) = record.id.replace(server_id) {
            self.identity.remove(&(model.to_string(), previous));
        }
        self.identity.insert(key, id);
        Ok(())
    }

    fn commit_failed(&mut self, id: RecordId) -> Result<()> {
        let state = self.record_node(id)?.state;
        let RecordState::InFlight { was_new } = state else {
            return Err(FragmentError::InvalidRecordState {
                state,
                action: "fail the save of",
            });
        };
        let dirty = self.owner_has_dirty_keys(Owner::Record(id));
        let record = self.record_node_mut(id)?;
        record.state = if was_new {
            RecordState::New
        } else if dirty {
            RecordState::Updated
        } else {
            RecordState::Saved
        };
        record.dirty_before_save = false;
        debug!(record = %id, state = %record.state, "save failed");
        Ok(())
    }

    fn rollback_record(&mut self, id: RecordId) -> Result<()> {
        self.silently(|store| store.rollback_owner(Owner::Record(id)))?;
        let discard_new = !self.options.suppress_reset_on_new_owner;
        let record = self.record_node_mut(id)?;
        record.state = match record.state {
            RecordState::Updated => RecordState::Saved,
            RecordState::New if discard_new => RecordState::Deleted,
            other => other,
        };
        debug!(record = %id, state = %record.state, "record rolled back");
        Ok(())
    }

    /// Removes the record and every node below it from the store.
    fn unload_record(&mut self, id: RecordId) -> Result<()> {
        let record = self.record_node(id)?;
        let identity = record.id.clone().map(|server| (record.model.clone(), server));
        let owned: Vec<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|node| self.root_record(*node) == Some(id))
            .collect();
        for node in &owned {
            self.nodes.remove(node);
        }
        self.records.remove(&id);
        if let Some(key) = identity {
            self.identity.remove(&key);
        }
        debug!(record = %id, nodes = owned.len(), "record unloaded");
        Ok(())
    }

    fn snapshot_owner(&self, owner: Owner) -> Result<Snapshot> {
        let (model, id) = match owner {
            Owner::Record(record) => {
                let record = self.record_node(record)?;
                (record.model.clone(), record.id.clone())
            }
            Owner::Fragment(node) => (self.fragment_node(node)?.model.clone(), None),
        };
        let table = self.table(owner)?;
        let schema = self.model_schema(&model)?;
        let mut snapshot = Snapshot::new(model.clone(), id);
        for name in schema.attribute_names() {
            let value = match table.current(name) {
                AttrValue::Scalar(scalar) => SnapshotValue::Scalar(scalar.clone()),
                AttrValue::Fragment(node) => {
                    SnapshotValue::Fragment(Box::new(self.snapshot_owner(Owner::Fragment(*node))?))
                }
                AttrValue::FragmentArray(node) => SnapshotValue::FragmentArray(
                    self.fragment_array_node(*node)?
                        .items
                        .current
                        .iter()
                        .map(|member| self.snapshot_owner(Owner::Fragment(*member)))
                        .collect::<Result<_>>()?,
                ),
                AttrValue::Array(node) => {
                    SnapshotValue::Array(self.primitive_array_node(*node)?.items.current.clone())
                }
            };
            snapshot.attributes.insert(name.to_string(), value);
        }
        Ok(snapshot)
    }
}

/// Mutable view of one record.
pub struct RecordHandle<'a> {
    store: &'a mut Store,
    id: RecordId,
}

impl<'a> RecordHandle<'a> {
    pub(crate) fn new(store: &'a mut Store, id: RecordId) -> Self {
        Self { store, id }
    }

    fn owner(&self) -> Owner {
        Owner::Record(self.id)
    }

    fn run<T>(&mut self, op: impl FnOnce(&mut Store, RecordId) -> Result<T>) -> Result<T> {
        let out = op(&mut *self.store, self.id);
        self.store.finish(out)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn model(&self) -> Result<&str> {
        Ok(&self.store.record_node(self.id)?.model)
    }

    /// Server id, once known.
    pub fn record_id(&self) -> Result<Option<&str>> {
        Ok(self.store.record_node(self.id)?.id.as_deref())
    }

    pub fn state(&self) -> Result<RecordState> {
        self.store.record_state(self.id)
    }

    pub fn get(&self, key: &str) -> Result<AttrValue> {
        self.store.owner_get(self.owner(), key)
    }

    pub fn get_json(&self, key: &str) -> Result<Value> {
        self.store.owner_get_json(self.owner(), key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        let value = value.into();
        self.run(|store, id| store.owner_set(Owner::Record(id), key, value))
    }

    pub fn set_json(&mut self, key: &str, raw: &Value) -> Result<()> {
        self.run(|store, id| store.atomically(|store| store.owner_set_json(Owner::Record(id), key, raw)))
    }

    /// `true` while the record is new or updated. During a save it reports
    /// the dirtiness the record had when the save started.
    pub fn has_dirty_attributes(&self) -> Result<bool> {
        self.store.record_has_dirty_attributes(self.id)
    }

    pub fn changed_attributes(&self) -> Result<ChangedAttributes> {
        self.store.changed_attributes(self.owner())
    }

    /// Discards every uncommitted change on the record and in every node it
    /// owns. Allowed at any time, including during a save.
    pub fn rollback_attributes(&mut self) -> Result<()> {
        self.run(|store, id| store.rollback_record(id))
    }

    pub fn serialize(&self) -> Result<Value> {
        self.store
            .serialize_attributes(self.owner(), Version::Current)
            .map(Value::Object)
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.store.snapshot_owner(self.owner())
    }

    /// Starts a save: the record goes in flight and the payload to send is
    /// returned.
    pub fn will_commit(&mut self) -> Result<Value> {
        self.run(|store, id| store.will_commit(id))
    }

    /// Completes a save. The current tree becomes committed, then the
    /// optional server payload is merged into committed data.
    pub fn did_commit(&mut self, payload: Option<&Value>) -> Result<()> {
        self.run(|store, id| store.did_commit(id, payload))
    }

    /// Abandons a save, leaving every change in place.
    pub fn commit_failed(&mut self) -> Result<()> {
        self.run(|store, id| store.commit_failed(id))
    }

    /// Marks the record deleted. Owner notifications reaching it afterwards
    /// are ignored.
    pub fn delete(&mut self) -> Result<()> {
        self.run(|store, id| {
            store.record_node_mut(id)?.state = RecordState::Deleted;
            debug!(record = %id, "record deleted");
            Ok(())
        })
    }

    pub fn unload(self) -> Result<()> {
        let out = self.store.unload_record(self.id);
        self.store.finish(out)
    }
}
