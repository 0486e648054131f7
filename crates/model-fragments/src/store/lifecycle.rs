//! Whole-tree commit, rollback, release and copy.
//!
//! These run with owner notifications silenced: each level sets its own
//! state directly, and the public entry points tell the owner of the top
//! node once at the end.

use std::collections::HashSet;

use tracing::trace;

use crate::error::Result;
use crate::ids::{NodeId, Owner, OwnerLink, RecordId};
use crate::nodes::{
    AttrTable, FragmentArrayNode, FragmentNode, Node, NodeKind, PrimitiveArrayNode,
    StatefulArray,
};
use crate::state::{FragmentEvent, FragmentState};
use crate::value::AttrValue;

use super::transform::Origin;
use super::Store;

impl Store {
    // ── Commit ───────────────────────────────────────────────────────────

    /// Folds pending state into committed state, owner first, then every
    /// node reachable from the new committed values. Nodes that drop out of
    /// committed state on the way are pushed onto `released`.
    pub(crate) fn commit_owner(&mut self, owner: Owner, released: &mut Vec<NodeId>) -> Result<()> {
        let before = committed_nodes(self.table(owner)?);
        self.table_mut(owner)?.commit();
        if let Owner::Fragment(id) = owner {
            if self.fragment_node(id)?.state.is_loaded() {
                self.send(id, FragmentEvent::DidCommit)?;
            }
        }
        let after = committed_nodes(self.table(owner)?);
        released.extend(before.into_iter().filter(|node| !after.contains(node)));
        for child in after {
            self.commit_node(child, released)?;
        }
        Ok(())
    }

    fn commit_node(&mut self, id: NodeId, released: &mut Vec<NodeId>) -> Result<()> {
        match self.node(id)?.kind() {
            NodeKind::Fragment => self.commit_owner(Owner::Fragment(id), released),
            NodeKind::FragmentArray => {
                let arr = self.fragment_array_node_mut(id)?;
                released.extend(
                    arr.items
                        .original
                        .iter()
                        .filter(|member| !arr.items.current.contains(member)),
                );
                arr.items.commit();
                let members = arr.items.current.clone();
                for member in members {
                    self.commit_owner(Owner::Fragment(member), released)?;
                }
                self.fragment_array_node_mut(id)?.items.reported_dirty = false;
                Ok(())
            }
            NodeKind::PrimitiveArray => {
                let arr = self.primitive_array_node_mut(id)?;
                arr.items.commit();
                arr.items.reported_dirty = false;
                Ok(())
            }
        }
    }

    // ── Release ──────────────────────────────────────────────────────────

    /// Removes `released` nodes and everything below them from the arena,
    /// keeping whatever the record's tree still reaches.
    pub(crate) fn release_nodes(&mut self, record: RecordId, released: Vec<NodeId>) -> Result<()> {
        if released.is_empty() {
            return Ok(());
        }
        let live = self.reachable(table_nodes(&self.record_node(record)?.attrs));
        let dead: Vec<NodeId> = self
            .reachable(released)
            .into_iter()
            .filter(|node| !live.contains(node))
            .collect();
        for node in &dead {
            self.nodes.remove(node);
        }
        trace!(%record, count = dead.len(), "released replaced nodes");
        Ok(())
    }

    /// Every node below `roots`, through committed and pending values.
    fn reachable(&self, roots: Vec<NodeId>) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = roots;
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.nodes.get(&id) {
                Some(Node::Fragment(n)) => stack.extend(table_nodes(&n.attrs)),
                Some(Node::FragmentArray(n)) => {
                    stack.extend(n.items.current.iter().chain(&n.items.original))
                }
                Some(Node::PrimitiveArray(_)) | None => {}
            }
        }
        seen
    }

    // ── Rollback ─────────────────────────────────────────────────────────

    /// Drops pending assignments of `owner` and rolls back every node that
    /// is reachable through its committed values.
    pub(crate) fn rollback_owner(&mut self, owner: Owner) -> Result<()> {
        let discarded = self.table_mut(owner)?.discard();
        if !discarded.is_empty() {
            trace!(%owner, count = discarded.len(), "discarded pending assignments");
        }
        for child in committed_nodes(self.table(owner)?) {
            self.rollback_node(child)?;
        }
        if let Owner::Fragment(id) = owner {
            self.send(id, FragmentEvent::RolledBack)?;
        }
        Ok(())
    }

    pub(crate) fn rollback_node(&mut self, id: NodeId) -> Result<()> {
        match self.node(id)?.kind() {
            NodeKind::Fragment => self.rollback_owner(Owner::Fragment(id)),
            NodeKind::FragmentArray => {
                let arr = self.fragment_array_node_mut(id)?;
                arr.items.rollback();
                let members = arr.items.current.clone();
                for member in members {
                    self.rollback_owner(Owner::Fragment(member))?;
                }
                let dirty = self.node_is_dirty(id);
                self.fragment_array_node_mut(id)?.items.reported_dirty = dirty;
                Ok(())
            }
            NodeKind::PrimitiveArray => {
                let arr = self.primitive_array_node_mut(id)?;
                arr.items.rollback();
                arr.items.reported_dirty = false;
                Ok(())
            }
        }
    }

    /// Rolls back one node and tells its owner if it went clean.
    pub(crate) fn rollback_subtree(&mut self, id: NodeId) -> Result<()> {
        let was_dirty = match self.node(id)? {
            Node::Fragment(n) => n.state.is_dirty(),
            Node::FragmentArray(n) => n.items.reported_dirty,
            Node::PrimitiveArray(n) => n.items.reported_dirty,
        };
        self.silently(|store| store.rollback_node(id))?;
        if was_dirty && !self.node_is_dirty(id) {
            self.notify_owner_reset(id)?;
        }
        Ok(())
    }

    // ── Copy ─────────────────────────────────────────────────────────────

    /// Deep-copies the current values of `id` into a new unowned node.
    /// Only the top fragment takes `origin`; nested copies are saved.
    pub(crate) fn copy_node(&mut self, id: NodeId, origin: Origin) -> Result<NodeId> {
        match self.node(id)?.clone() {
            Node::Fragment(source) => {
                let copy = self.alloc_node(Node::Fragment(FragmentNode {
                    model: source.model.clone(),
                    link: None,
                    state: FragmentState::Empty,
                    attrs: AttrTable::default(),
                }));
                for key in source.attrs.keys() {
                    let value = source.attrs.current(key);
                    let value = match value.node() {
                        Some(child) => {
                            let child_copy = self.copy_node(child, Origin::Pushed)?;
                            self.attach(child_copy, &OwnerLink::new(Owner::Fragment(copy), key.as_str()))?;
                            value.rebind(child_copy)
                        }
                        None => value.clone(),
                    };
                    self.fragment_node_mut(copy)?
                        .attrs
                        .data
                        .insert(key.clone(), value);
                }
                let event = match origin {
                    Origin::Pushed => FragmentEvent::PushedData,
                    Origin::Local => FragmentEvent::LoadedData,
                };
                self.send(copy, event)?;
                Ok(copy)
            }
            Node::FragmentArray(source) => {
                let mut members = Vec::with_capacity(source.items.len());
                for member in &source.items.current {
                    members.push(self.copy_node(*member, Origin::Pushed)?);
                }
                Ok(self.alloc_node(Node::FragmentArray(FragmentArrayNode {
                    model: source.model,
                    options: source.options,
                    link: None,
                    items: StatefulArray::new(members),
                })))
            }
            Node::PrimitiveArray(source) => Ok(self.alloc_node(Node::PrimitiveArray(
                PrimitiveArrayNode {
                    item: source.item,
                    link: None,
                    items: StatefulArray::new(source.items.current),
                },
            ))),
        }
    }
}

/// Nodes referenced from committed values.
fn committed_nodes(table: &AttrTable) -> Vec<NodeId> {
    table.data.values().filter_map(AttrValue::node).collect()
}

/// Nodes referenced from committed or pending values.
fn table_nodes(table: &AttrTable) -> Vec<NodeId> {
    table
        .data
        .values()
        .chain(table.attributes.values())
        .filter_map(AttrValue::node)
        .collect()
}
