//! The fragment store.
//!
//! [`Store`] owns every record and every nested node in flat arena tables.
//! Nodes refer to their owner through an [`OwnerLink`] (ids only), so the
//! tree has no reference cycles and any node can be addressed directly.
//!
//! Mutations go through typed handles obtained from the store:
//!
//! ```
//! use std::sync::Arc;
//! use model_fragments::{Registry, Store, Transform};
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .fragment("name", |m| m.attr("first", Transform::String))
//!     .record("person", |m| m.fragment("name", "name"))
//!     .build()
//!     .unwrap();
//! let mut store = Store::new(Arc::new(registry));
//!
//! let person = store
//!     .push_record("person", "1", &json!({ "name": { "first": "Jon" } }))
//!     .unwrap();
//! let name = store.record(person).unwrap().get("name").unwrap().as_fragment().unwrap();
//! store.fragment(name).unwrap().set("first", "Aegon").unwrap();
//! assert!(store.record(person).unwrap().has_dirty_attributes().unwrap());
//! ```

mod attributes;
mod fragment;
mod fragment_array;
mod lifecycle;
mod ownership;
mod primitive_array;
mod record;
mod transform;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use model_fragments_schema::{AttributeDef, ModelSchema, Registry};
use serde::Deserialize;

use crate::error::{FragmentError, Result};
use crate::events::OwnerEvent;
use crate::ids::{NodeId, Owner, OwnerLink, RecordId};
use crate::nodes::{AttrTable, FragmentArrayNode, FragmentNode, Node, PrimitiveArrayNode};
use crate::record::{RecordNode, RecordState};

pub use attributes::ChangedAttributes;
pub use fragment::FragmentHandle;
pub use fragment_array::FragmentArrayHandle;
pub use primitive_array::ArrayHandle;
pub use record::RecordHandle;

type Listener = Box<dyn FnMut(&OwnerEvent) + Send + Sync>;

/// Store behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreOptions {
    /// When a fragment owned by a never-saved record becomes clean, do not
    /// pass the reset on to the record. With `false` the record is told, and
    /// a new record left without changes moves to [`RecordState::Deleted`].
    pub suppress_reset_on_new_owner: bool,
    /// Re-check stored dirty flags and links after every public mutation,
    /// failing it with [`FragmentError::InvariantViolation`] on the first
    /// mismatch.
    pub validate_invariants: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            suppress_reset_on_new_owner: true,
            validate_invariants: cfg!(debug_assertions),
        }
    }
}

impl StoreOptions {
    /// Parses a `[store]`-style TOML table, e.g.
    /// `suppress_reset_on_new_owner = false`.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|err| FragmentError::Schema(err.into()))
    }
}

pub struct Store {
    pub(crate) registry: Arc<Registry>,
    pub(crate) options: StoreOptions,
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) records: HashMap<RecordId, RecordNode>,
    /// `(model, id)` of every record that has a server id.
    pub(crate) identity: HashMap<(String, String), RecordId>,
    next_node: u64,
    next_record: u64,
    /// While non-zero, owner notifications are skipped.
    silence: usize,
    next_listener_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("nodes", &self.nodes.len())
            .field("records", &self.records.len())
            .field("listeners", &self.listeners.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Store {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_options(registry, StoreOptions::default())
    }

    pub fn with_options(registry: Arc<Registry>, options: StoreOptions) -> Self {
        Self {
            registry,
            options,
            nodes: HashMap::new(),
            records: HashMap::new(),
            identity: HashMap::new(),
            next_node: 1,
            next_record: 1,
            silence: 0,
            next_listener_id: 1,
            listeners: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Whether `model` names a registered fragment type.
    pub fn is_fragment(&self, model: &str) -> bool {
        self.registry.is_fragment(model)
    }

    // ── Handles ──────────────────────────────────────────────────────────

    pub fn fragment(&mut self, id: NodeId) -> Result<FragmentHandle<'_>> {
        self.fragment_node(id)?;
        Ok(FragmentHandle::new(self, id))
    }

    pub fn fragment_array(&mut self, id: NodeId) -> Result<FragmentArrayHandle<'_>> {
        self.fragment_array_node(id)?;
        Ok(FragmentArrayHandle::new(self, id))
    }

    pub fn array(&mut self, id: NodeId) -> Result<ArrayHandle<'_>> {
        self.primitive_array_node(id)?;
        Ok(ArrayHandle::new(self, id))
    }

    pub fn record(&mut self, id: RecordId) -> Result<RecordHandle<'_>> {
        self.record_node(id)?;
        Ok(RecordHandle::new(self, id))
    }

    // ── Read-only queries ────────────────────────────────────────────────

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_record(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Whether the node, or anything below it, differs from committed state.
    pub fn is_dirty(&self, id: NodeId) -> Result<bool> {
        self.node(id)?;
        Ok(self.node_is_dirty(id))
    }

    pub fn link(&self, id: NodeId) -> Result<Option<&OwnerLink>> {
        Ok(self.node(id)?.link())
    }

    pub fn record_state(&self, id: RecordId) -> Result<RecordState> {
        Ok(self.record_node(id)?.state)
    }

    pub fn find_record(&self, model: &str, id: &str) -> Option<RecordId> {
        self.identity
            .get(&(model.to_string(), id.to_string()))
            .copied()
    }

    // ── Listeners ────────────────────────────────────────────────────────

    /// Registers a listener for owner notifications. Returns an id for
    /// [`Store::off_change`].
    pub fn on_change<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&OwnerEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change(&mut self, id: u64) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub(crate) fn emit(&mut self, event: OwnerEvent) {
        for listener in self.listeners.values_mut() {
            listener(&event);
        }
    }

    // ── Arena access ─────────────────────────────────────────────────────

    pub(crate) fn alloc_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, node);
        id
    }

    pub(crate) fn alloc_record(&mut self, record: RecordNode) -> RecordId {
        let id = RecordId(self.next_record);
        self.next_record += 1;
        self.records.insert(id, record);
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(FragmentError::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(FragmentError::NodeNotFound(id))
    }

    pub(crate) fn fragment_node(&self, id: NodeId) -> Result<&FragmentNode> {
        match self.node(id)? {
            Node::Fragment(n) => Ok(n),
            _ => Err(wrong_kind(id, "a fragment")),
        }
    }

    pub(crate) fn fragment_node_mut(&mut self, id: NodeId) -> Result<&mut FragmentNode> {
        match self.node_mut(id)? {
            Node::Fragment(n) => Ok(n),
            _ => Err(wrong_kind(id, "a fragment")),
        }
    }

    pub(crate) fn fragment_array_node(&self, id: NodeId) -> Result<&FragmentArrayNode> {
        match self.node(id)? {
            Node::FragmentArray(n) => Ok(n),
            _ => Err(wrong_kind(id, "a fragment array")),
        }
    }

    pub(crate) fn fragment_array_node_mut(&mut self, id: NodeId) -> Result<&mut FragmentArrayNode> {
        match self.node_mut(id)? {
            Node::FragmentArray(n) => Ok(n),
            _ => Err(wrong_kind(id, "a fragment array")),
        }
    }

    pub(crate) fn primitive_array_node(&self, id: NodeId) -> Result<&PrimitiveArrayNode> {
        match self.node(id)? {
            Node::PrimitiveArray(n) => Ok(n),
            _ => Err(wrong_kind(id, "an array")),
        }
    }

    pub(crate) fn primitive_array_node_mut(
        &mut self,
        id: NodeId,
    ) -> Result<&mut PrimitiveArrayNode> {
        match self.node_mut(id)? {
            Node::PrimitiveArray(n) => Ok(n),
            _ => Err(wrong_kind(id, "an array")),
        }
    }

    pub(crate) fn record_node(&self, id: RecordId) -> Result<&RecordNode> {
        self.records.get(&id).ok_or(FragmentError::RecordNotFound(id))
    }

    pub(crate) fn record_node_mut(&mut self, id: RecordId) -> Result<&mut RecordNode> {
        self.records
            .get_mut(&id)
            .ok_or(FragmentError::RecordNotFound(id))
    }

    pub(crate) fn table(&self, owner: Owner) -> Result<&AttrTable> {
        match owner {
            Owner::Record(id) => Ok(&self.record_node(id)?.attrs),
            Owner::Fragment(id) => Ok(&self.fragment_node(id)?.attrs),
        }
    }

    pub(crate) fn table_mut(&mut self, owner: Owner) -> Result<&mut AttrTable> {
        match owner {
            Owner::Record(id) => Ok(&mut self.record_node_mut(id)?.attrs),
            Owner::Fragment(id) => Ok(&mut self.fragment_node_mut(id)?.attrs),
        }
    }

    pub(crate) fn owner_model(&self, owner: Owner) -> Result<&str> {
        match owner {
            Owner::Record(id) => Ok(&self.record_node(id)?.model),
            Owner::Fragment(id) => Ok(&self.fragment_node(id)?.model),
        }
    }

    pub(crate) fn model_schema(&self, model: &str) -> Result<&ModelSchema> {
        Ok(self.registry.model(model)?)
    }

    pub(crate) fn attribute_def(&self, owner: Owner, key: &str) -> Result<AttributeDef> {
        let model = self.owner_model(owner)?;
        self.model_schema(model)?
            .attribute(key)
            .cloned()
            .ok_or_else(|| FragmentError::UnknownAttribute {
                model: model.to_string(),
                name: key.to_string(),
            })
    }

    // ── Bulk operation guards ────────────────────────────────────────────

    /// Runs `f` with owner notifications switched off.
    pub(crate) fn silently<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.silence += 1;
        let out = f(self);
        self.silence -= 1;
        out
    }

    pub(crate) fn is_silenced(&self) -> bool {
        self.silence > 0
    }

    /// Runs `f`, restoring the arena tables if it fails.
    pub(crate) fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = (
            self.nodes.clone(),
            self.records.clone(),
            self.identity.clone(),
        );
        match f(self) {
            Ok(out) => Ok(out),
            Err(err) => {
                (self.nodes, self.records, self.identity) = saved;
                Err(err)
            }
        }
    }

    /// Epilogue of every public mutation.
    pub(crate) fn finish<T>(&self, out: Result<T>) -> Result<T> {
        let out = out?;
        if self.options.validate_invariants {
            self.validate_invariants()
                .map_err(FragmentError::InvariantViolation)?;
        }
        Ok(out)
    }

    // ── Derived dirtiness ────────────────────────────────────────────────

    pub(crate) fn node_is_dirty(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(Node::Fragment(n)) => n.state.is_dirty(),
            Some(Node::FragmentArray(n)) => {
                n.items.changed() || n.items.current.iter().any(|m| self.node_is_dirty(*m))
            }
            Some(Node::PrimitiveArray(n)) => n.items.changed(),
            None => false,
        }
    }

    pub(crate) fn key_is_dirty(&self, table: &AttrTable, key: &str) -> bool {
        table.is_pending(key)
            || table
                .current(key)
                .node()
                .is_some_and(|id| self.node_is_dirty(id))
    }

    pub(crate) fn table_has_dirty_keys(&self, table: &AttrTable) -> bool {
        table.keys().any(|key| self.key_is_dirty(table, key))
    }

    pub(crate) fn owner_has_dirty_keys(&self, owner: Owner) -> bool {
        self.table(owner)
            .map(|table| self.table_has_dirty_keys(table))
            .unwrap_or(false)
    }

    pub(crate) fn dirty_keys(&self, owner: Owner) -> Result<Vec<String>> {
        let table = self.table(owner)?;
        Ok(table
            .keys()
            .filter(|key| self.key_is_dirty(table, key))
            .cloned()
            .collect())
    }

    // ── Invariants ───────────────────────────────────────────────────────

    /// Walks every record and every unowned node, checking stored dirty
    /// flags against the value derived from the tree and every link against
    /// the slot that holds the node. Nodes no slot refers to any more are
    /// not visited.
    pub fn validate_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for (id, record) in &self.records {
            let dirty = self.table_has_dirty_keys(&record.attrs);
            match record.state {
                RecordState::Saved if dirty => {
                    return Err(format!("{id} is saved but has dirty attributes"))
                }
                RecordState::Updated if !dirty => {
                    return Err(format!("{id} is updated but has no dirty attributes"))
                }
                _ => {}
            }
            self.validate_table(Owner::Record(*id), &record.attrs, &mut seen)?;
        }
        for (id, node) in &self.nodes {
            if node.link().is_none() {
                self.validate_node(*id, &mut seen)?;
            }
        }
        Ok(())
    }

    fn validate_table(
        &self,
        owner: Owner,
        table: &AttrTable,
        seen: &mut HashSet<NodeId>,
    ) -> std::result::Result<(), String> {
        for key in table.keys() {
            let expected = OwnerLink::new(owner, key.as_str());
            for value in [table.committed(key), table.current(key)] {
                let Some(child) = value.node() else { continue };
                let node = self
                    .nodes
                    .get(&child)
                    .ok_or_else(|| format!("{expected} points at missing {child}"))?;
                if node.link() != Some(&expected) {
                    return Err(format!("{child} is not linked to {expected}"));
                }
                self.validate_node(child, seen)?;
            }
        }
        Ok(())
    }

    fn validate_node(
        &self,
        id: NodeId,
        seen: &mut HashSet<NodeId>,
    ) -> std::result::Result<(), String> {
        if !seen.insert(id) {
            return Ok(());
        }
        match self.nodes.get(&id) {
            None => Err(format!("{id} is missing")),
            Some(Node::Fragment(n)) => {
                if !n.state.is_concrete() {
                    return Err(format!("{id} is in abstract state {}", n.state));
                }
                if n.state.is_loaded() {
                    let derived = n.state.is_new() || self.table_has_dirty_keys(&n.attrs);
                    if derived != n.state.is_dirty() {
                        return Err(format!(
                            "{id} is in {} but derived dirtiness is {derived}",
                            n.state
                        ));
                    }
                }
                self.validate_table(Owner::Fragment(id), &n.attrs, seen)
            }
            Some(Node::FragmentArray(n)) => {
                // An unowned array has nobody to report to.
                let Some(link) = &n.link else { return Ok(()) };
                if n.items.reported_dirty != self.node_is_dirty(id) {
                    return Err(format!("{id} reported dirtiness is stale"));
                }
                for member in n.items.current.iter().chain(&n.items.original) {
                    let linked = self.nodes.get(member).and_then(Node::link);
                    if linked != Some(link) {
                        return Err(format!("member {member} of {id} is not linked to {link}"));
                    }
                    self.validate_node(*member, seen)?;
                }
                Ok(())
            }
            Some(Node::PrimitiveArray(n)) => {
                if n.link.is_some() && n.items.reported_dirty != n.items.changed() {
                    return Err(format!("{id} reported dirtiness is stale"));
                }
                Ok(())
            }
        }
    }
}

fn wrong_kind(id: NodeId, expected: &'static str) -> FragmentError {
    FragmentError::WrongNodeKind { id, expected }
}
