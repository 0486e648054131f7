//! Attribute reads and writes shared by records and fragments.

use indexmap::IndexMap;
use model_fragments_schema::{AttributeDef, AttributeKind, AttributeOptions, Scalar};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, Owner, OwnerLink};
use crate::nodes::{FragmentArrayNode, Node, StatefulArray};
use crate::value::AttrValue;

use super::transform::{deserialize_items, invalid_payload, Origin, Version};
use super::Store;

/// `key → (committed JSON, current JSON)` for every dirty attribute.
pub type ChangedAttributes = IndexMap<String, (Value, Value)>;

impl Store {
    pub(crate) fn owner_get(&self, owner: Owner, key: &str) -> Result<AttrValue> {
        self.attribute_def(owner, key)?;
        Ok(self.table(owner)?.current(key).clone())
    }

    pub(crate) fn owner_get_json(&self, owner: Owner, key: &str) -> Result<Value> {
        let def = self.attribute_def(owner, key)?;
        self.serialize_attr(self.table(owner)?.current(key), &def, Version::Current)
    }

    /// Assigns `value` to `owner.key` and re-evaluates the key against its
    /// committed value.
    pub(crate) fn owner_set(&mut self, owner: Owner, key: &str, value: AttrValue) -> Result<()> {
        let def = self.attribute_def(owner, key)?;
        let value = self.check_assignment(&def, value)?;
        let link = OwnerLink::new(owner, key);
        if let Some(node) = value.node() {
            self.check_attach(node, &link)?;
            self.attach(node, &link)?;
        }
        let pending = self.table_mut(owner)?.assign(key, value);
        let dirty = pending || self.key_is_dirty(self.table(owner)?, key);
        trace!(%owner, key, dirty, "attribute assigned");
        if dirty {
            self.owner_become_dirty(owner)
        } else {
            self.owner_property_was_reset(owner, key)
        }
    }

    fn check_assignment(&self, def: &AttributeDef, value: AttrValue) -> Result<AttrValue> {
        match (&def.kind, value) {
            (_, AttrValue::Scalar(Scalar::Null)) => Ok(AttrValue::NULL),
            (AttributeKind::Attr(transform), AttrValue::Scalar(scalar)) => {
                Ok(AttrValue::Scalar(transform.normalize(scalar)?))
            }
            (AttributeKind::Fragment(declared), AttrValue::Fragment(id)) => {
                self.check_fragment_type(declared, id)?;
                Ok(AttrValue::Fragment(id))
            }
            (AttributeKind::FragmentArray(declared), AttrValue::FragmentArray(id)) => {
                for member in &self.fragment_array_node(id)?.items.current {
                    self.check_fragment_type(declared, *member)?;
                }
                Ok(AttrValue::FragmentArray(id))
            }
            (AttributeKind::Array(_), AttrValue::Array(id)) => {
                self.primitive_array_node(id)?;
                Ok(AttrValue::Array(id))
            }
            (kind, other) => Err(FragmentError::AttributeKindMismatch {
                name: def.name.clone(),
                expected: expected_kind(kind),
                actual: other.kind_name(),
            }),
        }
    }

    pub(crate) fn check_fragment_type(&self, declared: &str, id: NodeId) -> Result<()> {
        let model = &self.fragment_node(id)?.model;
        if self.registry.is_a(model, declared) {
            Ok(())
        } else {
            Err(FragmentError::WrongFragmentType {
                expected: declared.to_string(),
                actual: model.clone(),
            })
        }
    }

    /// Assigns a raw JSON value, reusing nested nodes where the shapes line
    /// up.
    pub(crate) fn owner_set_json(&mut self, owner: Owner, key: &str, raw: &Value) -> Result<()> {
        let def = self.attribute_def(owner, key)?;
        let current = self.table(owner)?.current(key).clone();
        match (&def.kind, raw) {
            (AttributeKind::Attr(transform), _) => {
                let scalar = transform.deserialize(raw)?;
                self.owner_set(owner, key, AttrValue::Scalar(scalar))
            }
            (_, Value::Null) => self.owner_set(owner, key, AttrValue::NULL),
            (AttributeKind::Fragment(declared), Value::Object(payload)) => {
                let model = self.resolve_payload_model(declared, &def.options, payload)?;
                match current.as_fragment() {
                    Some(existing) if self.fragment_node(existing)?.model == model => {
                        self.merge_json(existing, payload, &def.options)
                    }
                    _ => {
                        let id = self.create_local_fragment(&model, payload, &def.options)?;
                        self.owner_set(owner, key, AttrValue::Fragment(id))
                    }
                }
            }
            (AttributeKind::FragmentArray(declared), Value::Array(items)) => {
                match current.as_fragment_array() {
                    Some(arr) => self.fragment_array_set_json(arr, items),
                    None => {
                        let arr = self.alloc_node(Node::FragmentArray(FragmentArrayNode {
                            model: declared.clone(),
                            options: def.options.clone(),
                            link: None,
                            items: StatefulArray::new(Vec::new()),
                        }));
                        self.fragment_array_set_json(arr, items)?;
                        self.owner_set(owner, key, AttrValue::FragmentArray(arr))
                    }
                }
            }
            (AttributeKind::Array(item), Value::Array(items)) => match current.as_array() {
                Some(arr) => {
                    let values = deserialize_items(*item, items)?;
                    self.primitive_set_objects(arr, values)
                }
                None => {
                    let value = self.silently(|store| {
                        store.hydrate_value(raw, &def, None, Origin::Local)
                    })?;
                    self.owner_set(owner, key, value)
                }
            },
            (kind, _) => Err(invalid_payload(
                key,
                format!("expected {} payload, got {raw}", kind.as_str()),
            )),
        }
    }

    /// Applies each key of `payload` to an existing fragment. The
    /// discriminator of a polymorphic attribute is not an attribute.
    fn merge_json(
        &mut self,
        id: NodeId,
        payload: &Map<String, Value>,
        options: &AttributeOptions,
    ) -> Result<()> {
        for (key, raw) in payload {
            if options.polymorphic && key == &options.type_key {
                continue;
            }
            self.owner_set_json(Owner::Fragment(id), key, raw)?;
        }
        Ok(())
    }

    /// Factory path: defaults as committed data, `payload` as pending
    /// assignments, `loaded.created` state.
    pub(crate) fn create_local_fragment(
        &mut self,
        model: &str,
        payload: &Map<String, Value>,
        options: &AttributeOptions,
    ) -> Result<NodeId> {
        let id = self.silently(|store| store.hydrate_fragment(model, &Map::new(), Origin::Local))?;
        self.merge_json(id, payload, options)?;
        Ok(id)
    }

    /// Replaces the members of `arr` from object literals, updating the
    /// member at the same index in place when its type matches.
    pub(crate) fn fragment_array_set_json(&mut self, arr: NodeId, items: &[Value]) -> Result<()> {
        let node = self.fragment_array_node(arr)?;
        let declared = node.model.clone();
        let options = node.options.clone();
        let current = node.items.current.clone();

        let mut next = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let payload = item
                .as_object()
                .ok_or_else(|| invalid_payload(&declared, "array members must be objects"))?;
            let model = self.resolve_payload_model(&declared, &options, payload)?;
            match current.get(index) {
                Some(&member) if self.fragment_node(member)?.model == model => {
                    self.merge_json(member, payload, &options)?;
                    next.push(member);
                }
                _ => next.push(self.create_local_fragment(&model, payload, &options)?),
            }
        }
        self.fragment_array_set_objects(arr, next)
    }

    pub(crate) fn changed_attributes(&self, owner: Owner) -> Result<ChangedAttributes> {
        let table = self.table(owner)?;
        let mut out = ChangedAttributes::new();
        for key in self.dirty_keys(owner)? {
            let def = self.attribute_def(owner, &key)?;
            let before = self.serialize_attr(table.committed(&key), &def, Version::Committed)?;
            let after = self.serialize_attr(table.current(&key), &def, Version::Current)?;
            out.insert(key, (before, after));
        }
        Ok(out)
    }
}

fn expected_kind(kind: &AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Attr(_) => "a scalar",
        AttributeKind::Fragment(_) => "a fragment",
        AttributeKind::FragmentArray(_) => "a fragment array",
        AttributeKind::Array(_) => "an array",
    }
}
