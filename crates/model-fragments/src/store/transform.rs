//! JSON payloads in and out of the arena.
//!
//! Hydration builds nodes from payloads: pushed payloads produce
//! `loaded.saved` fragments, local ones (`Origin::Local`) a `loaded.created`
//! fragment at the top with saved fragments below it. A key missing from a
//! payload takes the attribute default, or null (`[]` for arrays). Keys the
//! schema does not know are skipped.

use model_fragments_schema::{
    AttributeDef, AttributeKind, AttributeOptions, Scalar, SchemaError, Transform,
};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, Owner, OwnerLink};
use crate::nodes::{
    AttrTable, FragmentArrayNode, FragmentNode, Node, PrimitiveArrayNode, StatefulArray,
};
use crate::state::{FragmentEvent, FragmentState};
use crate::value::AttrValue;

use super::Store;

/// Which side of every node a serialization reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Version {
    Current,
    Committed,
}

impl Version {
    fn items<T>(self, items: &StatefulArray<T>) -> &[T] {
        match self {
            Version::Current => &items.current,
            Version::Committed => &items.original,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Data from the persistence layer.
    Pushed,
    /// Data built locally through a factory.
    Local,
}

impl Store {
    /// Builds a value for `owner.key` from a raw payload, linked to that
    /// slot but not assigned to it.
    pub fn hydrate(&mut self, owner: Owner, key: &str, raw: &Value) -> Result<AttrValue> {
        let def = self.attribute_def(owner, key)?;
        let link = OwnerLink::new(owner, key);
        let out = self.atomically(|store| {
            store.silently(|store| store.hydrate_value(raw, &def, Some(&link), Origin::Pushed))
        });
        self.finish(out)
    }

    /// Serializes any slot value. Fragments carry their discriminator when
    /// the attribute they are linked under is polymorphic.
    pub fn serialize_value(&self, value: &AttrValue) -> Result<Value> {
        match value {
            AttrValue::Scalar(scalar) => Ok(scalar.to_json()),
            AttrValue::Fragment(id) => {
                let type_key = self.fragment_type_key(*id)?;
                self.serialize_fragment(*id, type_key.as_deref(), Version::Current)
            }
            AttrValue::FragmentArray(id) => self.serialize_fragment_array(*id, Version::Current),
            AttrValue::Array(id) => self.serialize_primitive_array(*id, Version::Current),
        }
    }

    // ── Hydration ────────────────────────────────────────────────────────

    pub(crate) fn hydrate_value(
        &mut self,
        raw: &Value,
        def: &AttributeDef,
        link: Option<&OwnerLink>,
        origin: Origin,
    ) -> Result<AttrValue> {
        match (&def.kind, raw) {
            (AttributeKind::Attr(transform), _) => Ok(AttrValue::Scalar(transform.deserialize(raw)?)),
            (_, Value::Null) => Ok(AttrValue::NULL),
            (AttributeKind::Fragment(declared), Value::Object(payload)) => {
                let model = self.resolve_payload_model(declared, &def.options, payload)?;
                let id = self.hydrate_fragment(&model, payload, origin)?;
                self.link_new(id, link)?;
                Ok(AttrValue::Fragment(id))
            }
            (AttributeKind::FragmentArray(declared), Value::Array(items)) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    let payload = item
                        .as_object()
                        .ok_or_else(|| invalid_payload(&def.name, "array members must be objects"))?;
                    let model = self.resolve_payload_model(declared, &def.options, payload)?;
                    members.push(self.hydrate_fragment(&model, payload, origin)?);
                }
                let id = self.alloc_node(Node::FragmentArray(FragmentArrayNode {
                    model: declared.clone(),
                    options: def.options.clone(),
                    link: None,
                    items: StatefulArray::new(members),
                }));
                self.link_new(id, link)?;
                Ok(AttrValue::FragmentArray(id))
            }
            (AttributeKind::Array(item), Value::Array(items)) => {
                let values = deserialize_items(*item, items)?;
                let id = self.alloc_node(Node::PrimitiveArray(PrimitiveArrayNode {
                    item: *item,
                    link: None,
                    items: StatefulArray::new(values),
                }));
                self.link_new(id, link)?;
                Ok(AttrValue::Array(id))
            }
            (kind, _) => Err(invalid_payload(
                &def.name,
                format!("expected {} payload, got {raw}", kind.as_str()),
            )),
        }
    }

    fn link_new(&mut self, id: NodeId, link: Option<&OwnerLink>) -> Result<()> {
        match link {
            Some(link) => self.attach(id, link),
            None => Ok(()),
        }
    }

    /// Allocates a fragment of the concrete `model` and fills it from
    /// `payload`.
    pub(crate) fn hydrate_fragment(
        &mut self,
        model: &str,
        payload: &Map<String, Value>,
        origin: Origin,
    ) -> Result<NodeId> {
        let schema = self.model_schema(model)?;
        if !schema.is_fragment() || schema.is_abstract {
            return Err(FragmentError::InvalidFragmentType(model.to_string()));
        }
        let attributes: Vec<AttributeDef> = schema.attributes.values().cloned().collect();
        let id = self.alloc_node(Node::Fragment(FragmentNode {
            model: model.to_string(),
            link: None,
            state: FragmentState::Empty,
            attrs: AttrTable::default(),
        }));
        self.hydrate_attributes(Owner::Fragment(id), &attributes, payload)?;
        let event = match origin {
            Origin::Pushed => FragmentEvent::PushedData,
            Origin::Local => FragmentEvent::LoadedData,
        };
        self.send(id, event)?;
        Ok(id)
    }

    /// Fills the committed data of `owner` for every declared attribute.
    pub(crate) fn hydrate_attributes(
        &mut self,
        owner: Owner,
        attributes: &[AttributeDef],
        payload: &Map<String, Value>,
    ) -> Result<()> {
        for def in attributes {
            let raw = payload
                .get(&def.name)
                .cloned()
                .unwrap_or_else(|| default_payload(def));
            let link = OwnerLink::new(owner, def.name.as_str());
            let value = self.hydrate_value(&raw, def, Some(&link), Origin::Pushed)?;
            self.table_mut(owner)?.data.insert(def.name.clone(), value);
        }
        for key in payload.keys() {
            if !attributes.iter().any(|def| &def.name == key) {
                trace!(%owner, key = %key, "ignoring unknown payload key");
            }
        }
        Ok(())
    }

    /// Picks the concrete model for a fragment payload.
    pub(crate) fn resolve_payload_model(
        &self,
        declared: &str,
        options: &AttributeOptions,
        payload: &Map<String, Value>,
    ) -> Result<String> {
        if !options.polymorphic {
            return Ok(declared.to_string());
        }
        let discriminator = match payload.get(&options.type_key) {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value.as_str()),
            Some(other) => {
                return Err(invalid_payload(
                    &options.type_key,
                    format!("discriminator must be a string, got {other}"),
                ))
            }
        };
        self.registry
            .resolve_variant(declared, discriminator)
            .map(|schema| schema.name.clone())
            .map_err(|err| match err {
                SchemaError::MissingTypeDiscriminator { model } => {
                    FragmentError::MissingTypeDiscriminator {
                        model,
                        key: options.type_key.clone(),
                    }
                }
                other => other.into(),
            })
    }

    // ── Pushing onto existing nodes ──────────────────────────────────────

    /// Replaces committed data of `owner` with server data, reusing nested
    /// nodes of a matching type. Keys absent from `payload` keep their value.
    pub(crate) fn push_attributes(&mut self, owner: Owner, payload: &Map<String, Value>) -> Result<()> {
        for (key, raw) in payload {
            let def = match self.attribute_def(owner, key) {
                Ok(def) => def,
                Err(FragmentError::UnknownAttribute { .. }) => {
                    trace!(%owner, key = %key, "ignoring unknown payload key");
                    continue;
                }
                Err(err) => return Err(err),
            };
            self.push_attribute(owner, &def, raw)?;
        }
        Ok(())
    }

    fn push_attribute(&mut self, owner: Owner, def: &AttributeDef, raw: &Value) -> Result<()> {
        let key = def.name.as_str();
        let committed = self.table(owner)?.committed(key).clone();
        let reused = match (&def.kind, &committed, raw) {
            (AttributeKind::Fragment(declared), AttrValue::Fragment(id), Value::Object(payload)) => {
                let model = self.resolve_payload_model(declared, &def.options, payload)?;
                if self.fragment_node(*id)?.model == model {
                    self.push_fragment(*id, payload)?;
                    true
                } else {
                    false
                }
            }
            (AttributeKind::FragmentArray(_), AttrValue::FragmentArray(id), Value::Array(items)) => {
                self.push_fragment_array(*id, items)?;
                true
            }
            (AttributeKind::Array(item), AttrValue::Array(id), Value::Array(items)) => {
                let values = deserialize_items(*item, items)?;
                self.primitive_array_node_mut(*id)?.items.setup(values);
                true
            }
            _ => false,
        };
        let value = if reused {
            committed
        } else {
            let link = OwnerLink::new(owner, key);
            self.hydrate_value(raw, def, Some(&link), Origin::Pushed)?
        };
        let table = self.table_mut(owner)?;
        table.data.insert(key.to_string(), value);
        table.attributes.shift_remove(key);
        Ok(())
    }

    fn push_fragment(&mut self, id: NodeId, payload: &Map<String, Value>) -> Result<()> {
        self.push_attributes(Owner::Fragment(id), payload)?;
        self.send(id, FragmentEvent::PushedData)?;
        if self.owner_has_dirty_keys(Owner::Fragment(id)) {
            self.send(id, FragmentEvent::BecomeDirty)?;
        }
        Ok(())
    }

    fn push_fragment_array(&mut self, id: NodeId, items: &[Value]) -> Result<()> {
        let node = self.fragment_array_node(id)?;
        let declared = node.model.clone();
        let options = node.options.clone();
        let current = node.items.current.clone();
        let link = node.link.clone();
        let name = link.as_ref().map_or(declared.as_str(), |l| l.key.as_str()).to_string();

        let mut next = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let payload = item
                .as_object()
                .ok_or_else(|| invalid_payload(&name, "array members must be objects"))?;
            let model = self.resolve_payload_model(&declared, &options, payload)?;
            match current.get(index) {
                Some(&member) if self.fragment_node(member)?.model == model => {
                    self.push_fragment(member, payload)?;
                    next.push(member);
                }
                _ => {
                    let member = self.hydrate_fragment(&model, payload, Origin::Pushed)?;
                    self.node_mut(member)?.set_link(link.clone());
                    next.push(member);
                }
            }
        }
        self.fragment_array_node_mut(id)?.items.setup(next);
        let dirty = self.node_is_dirty(id);
        self.fragment_array_node_mut(id)?.items.reported_dirty = dirty;
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────────────

    pub(crate) fn serialize_attributes(
        &self,
        owner: Owner,
        version: Version,
    ) -> Result<Map<String, Value>> {
        let table = self.table(owner)?;
        let schema = self.model_schema(self.owner_model(owner)?)?;
        let mut out = Map::new();
        for def in schema.attributes.values() {
            let value = match version {
                Version::Current => table.current(&def.name),
                Version::Committed => table.committed(&def.name),
            };
            out.insert(def.name.clone(), self.serialize_attr(value, def, version)?);
        }
        Ok(out)
    }

    pub(crate) fn serialize_attr(
        &self,
        value: &AttrValue,
        def: &AttributeDef,
        version: Version,
    ) -> Result<Value> {
        match value {
            AttrValue::Scalar(scalar) => Ok(match def.kind {
                AttributeKind::Attr(transform) => transform.serialize(scalar),
                _ => scalar.to_json(),
            }),
            AttrValue::Fragment(id) => {
                let type_key = def
                    .options
                    .polymorphic
                    .then_some(def.options.type_key.as_str());
                self.serialize_fragment(*id, type_key, version)
            }
            AttrValue::FragmentArray(id) => self.serialize_fragment_array(*id, version),
            AttrValue::Array(id) => self.serialize_primitive_array(*id, version),
        }
    }

    pub(crate) fn serialize_fragment(
        &self,
        id: NodeId,
        type_key: Option<&str>,
        version: Version,
    ) -> Result<Value> {
        let model = &self.fragment_node(id)?.model;
        let mut out = self.serialize_attributes(Owner::Fragment(id), version)?;
        if let Some(key) = type_key {
            let discriminator = self.model_schema(model)?.discriminator.clone();
            out.insert(key.to_string(), Value::String(discriminator));
        }
        Ok(Value::Object(out))
    }

    pub(crate) fn serialize_fragment_array(&self, id: NodeId, version: Version) -> Result<Value> {
        let node = self.fragment_array_node(id)?;
        let type_key = node
            .options
            .polymorphic
            .then_some(node.options.type_key.as_str());
        version
            .items(&node.items)
            .iter()
            .map(|member| self.serialize_fragment(*member, type_key, version))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    pub(crate) fn serialize_primitive_array(&self, id: NodeId, version: Version) -> Result<Value> {
        let node = self.primitive_array_node(id)?;
        Ok(Value::Array(
            version
                .items(&node.items)
                .iter()
                .map(|scalar| match node.item {
                    Some(transform) => transform.serialize(scalar),
                    None => scalar.to_json(),
                })
                .collect(),
        ))
    }

    /// Discriminator key for a fragment linked under a polymorphic attribute.
    pub(crate) fn fragment_type_key(&self, id: NodeId) -> Result<Option<String>> {
        let Some(link) = self.fragment_node(id)?.link.clone() else {
            return Ok(None);
        };
        let def = self.attribute_def(link.owner, &link.key)?;
        Ok(def.options.polymorphic.then_some(def.options.type_key))
    }
}

/// Payload used for a key missing from a hydrated object.
pub(crate) fn default_payload(def: &AttributeDef) -> Value {
    match (&def.options.default_value, &def.kind) {
        (Some(value), _) => value.clone(),
        (None, AttributeKind::FragmentArray(_) | AttributeKind::Array(_)) => Value::Array(Vec::new()),
        (None, _) => Value::Null,
    }
}

pub(crate) fn deserialize_items(item: Option<Transform>, items: &[Value]) -> Result<Vec<Scalar>> {
    items
        .iter()
        .map(|value| match item {
            Some(transform) => transform.deserialize(value).map_err(FragmentError::from),
            None => Ok(Scalar::from_json(value)),
        })
        .collect()
}

pub(crate) fn invalid_payload(name: &str, reason: impl Into<String>) -> FragmentError {
    FragmentError::InvalidPayload {
        name: name.to_string(),
        reason: reason.into(),
    }
}
