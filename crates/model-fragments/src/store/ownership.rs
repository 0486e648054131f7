//! Ownership links and owner notifications.
//!
//! A node that changes dirtiness tells its owner through
//! [`Store::notify_owner_dirty`] / [`Store::notify_owner_reset`]. Members of a
//! fragment array go through the array first: the array recomputes its own
//! dirtiness and only reports to the owner when that changes, so each owner
//! hears about every transition exactly once.

use tracing::{debug, trace, warn};

use crate::error::{FragmentError, Result};
use crate::events::{OwnerEvent, OwnerEventKind};
use crate::ids::{NodeId, Owner, OwnerLink, RecordId};
use crate::nodes::Node;
use crate::record::RecordState;
use crate::state::{self, Action, FragmentEvent, FragmentState, Setup};

use super::Store;

impl Store {
    // ── Links ────────────────────────────────────────────────────────────

    /// Fails unless `id` (and, for a fragment array, each of its members)
    /// can live under `link`.
    pub(crate) fn check_attach(&self, id: NodeId, link: &OwnerLink) -> Result<()> {
        let node = self.node(id)?;
        check_link(node.link(), link)?;
        if let Node::FragmentArray(arr) = node {
            for member in arr.items.current.iter().chain(&arr.items.original) {
                check_link(self.node(*member)?.link(), link)?;
            }
        }
        if self.would_cycle(link.owner, id) {
            return Err(FragmentError::CyclicOwnership(id));
        }
        Ok(())
    }

    /// Links `id` under `link`. For a fragment array the members follow.
    pub(crate) fn attach(&mut self, id: NodeId, link: &OwnerLink) -> Result<()> {
        let members = match self.node(id)? {
            Node::FragmentArray(arr) => arr
                .items
                .current
                .iter()
                .chain(&arr.items.original)
                .copied()
                .collect(),
            _ => Vec::new(),
        };
        self.node_mut(id)?.set_link(Some(link.clone()));
        for member in members {
            self.node_mut(member)?.set_link(Some(link.clone()));
        }
        // Unowned arrays do not keep their reported flag current.
        let dirty = self.node_is_dirty(id);
        match self.node_mut(id)? {
            Node::FragmentArray(n) => n.items.reported_dirty = dirty,
            Node::PrimitiveArray(n) => n.items.reported_dirty = dirty,
            Node::Fragment(_) => {}
        }
        Ok(())
    }

    /// Whether placing `id` under `owner` would put `id` above itself.
    fn would_cycle(&self, owner: Owner, id: NodeId) -> bool {
        let members: &[NodeId] = match self.nodes.get(&id) {
            Some(Node::FragmentArray(arr)) => &arr.items.current,
            _ => &[],
        };
        let mut cursor = Some(owner);
        while let Some(Owner::Fragment(fragment)) = cursor {
            if fragment == id || members.contains(&fragment) {
                return true;
            }
            cursor = self
                .nodes
                .get(&fragment)
                .and_then(Node::link)
                .map(|link| link.owner);
        }
        false
    }

    /// Follows links up to the record at the top of the tree, if any.
    pub(crate) fn root_record(&self, id: NodeId) -> Option<RecordId> {
        let mut cursor = self.nodes.get(&id)?.link()?.owner;
        loop {
            match cursor {
                Owner::Record(record) => return Some(record),
                Owner::Fragment(fragment) => {
                    cursor = self.nodes.get(&fragment)?.link()?.owner;
                }
            }
        }
    }

    // ── Notification routing ─────────────────────────────────────────────

    pub(crate) fn notify_owner_dirty(&mut self, child: NodeId) -> Result<()> {
        self.notify_owner(child, true)
    }

    pub(crate) fn notify_owner_reset(&mut self, child: NodeId) -> Result<()> {
        self.notify_owner(child, false)
    }

    fn notify_owner(&mut self, child: NodeId, dirty: bool) -> Result<()> {
        if self.is_silenced() {
            return Ok(());
        }
        let Some(link) = self.node(child)?.link().cloned() else {
            return Ok(());
        };
        let table = match self.table(link.owner) {
            Ok(table) => table,
            Err(_) => {
                warn!(node = %child, owner = %link.owner, "owner of node is gone");
                return Ok(());
            }
        };

        // Array members report through the array that holds them.
        let mut arrays = Vec::new();
        let mut in_slot = false;
        for value in [table.current(&link.key), table.committed(&link.key)] {
            match value.as_fragment_array() {
                Some(arr) if arr != child => {
                    if self.array_holds(arr, child) && !arrays.contains(&arr) {
                        arrays.push(arr);
                    }
                }
                _ => in_slot |= value.node() == Some(child),
            }
        }
        if !arrays.is_empty() {
            for arr in arrays {
                self.array_did_change(arr)?;
            }
            return Ok(());
        }
        if !in_slot {
            trace!(node = %child, link = %link, "detached node changed; owner not told");
            return Ok(());
        }
        if dirty {
            self.fragment_did_dirty(link.owner, &link.key, child)
        } else {
            self.fragment_did_reset(link.owner, &link.key, child)
        }
    }

    fn array_holds(&self, arr: NodeId, member: NodeId) -> bool {
        match self.nodes.get(&arr) {
            Some(Node::FragmentArray(n)) => {
                n.items.current.contains(&member) || n.items.original.contains(&member)
            }
            _ => false,
        }
    }

    /// Re-derives an array's dirtiness and reports a change to its owner.
    pub(crate) fn array_did_change(&mut self, arr: NodeId) -> Result<()> {
        let dirty = self.node_is_dirty(arr);
        let reported = match self.node_mut(arr)? {
            Node::FragmentArray(n) => &mut n.items.reported_dirty,
            Node::PrimitiveArray(n) => &mut n.items.reported_dirty,
            Node::Fragment(_) => return Ok(()),
        };
        if *reported == dirty {
            return Ok(());
        }
        *reported = dirty;
        trace!(array = %arr, dirty, "array dirtiness changed");
        if dirty {
            self.notify_owner_dirty(arr)
        } else {
            self.notify_owner_reset(arr)
        }
    }

    // ── Owner hooks ──────────────────────────────────────────────────────

    fn fragment_did_dirty(&mut self, owner: Owner, key: &str, child: NodeId) -> Result<()> {
        if self.owner_ignores_notifications(owner) {
            return Ok(());
        }
        trace!(%owner, key, %child, "fragment did dirty");
        self.emit(OwnerEvent {
            owner,
            kind: OwnerEventKind::FragmentDidDirty {
                key: key.to_string(),
                child,
            },
        });
        self.owner_become_dirty(owner)
    }

    fn fragment_did_reset(&mut self, owner: Owner, key: &str, child: NodeId) -> Result<()> {
        if self.owner_ignores_notifications(owner) {
            return Ok(());
        }
        trace!(%owner, key, %child, "fragment did reset");
        self.emit(OwnerEvent {
            owner,
            kind: OwnerEventKind::FragmentDidReset {
                key: key.to_string(),
                child,
            },
        });
        if let Owner::Record(record) = owner {
            if self.options.suppress_reset_on_new_owner && self.record_node(record)?.state.is_new()
            {
                trace!(%record, key, "reset not passed to new record");
                return Ok(());
            }
        }
        self.owner_property_was_reset(owner, key)
    }

    fn owner_ignores_notifications(&self, owner: Owner) -> bool {
        match owner {
            Owner::Record(record) => self
                .records
                .get(&record)
                .is_some_and(|r| r.state.is_deleted()),
            Owner::Fragment(_) => false,
        }
    }

    pub(crate) fn owner_become_dirty(&mut self, owner: Owner) -> Result<()> {
        self.emit(OwnerEvent {
            owner,
            kind: OwnerEventKind::BecomeDirty,
        });
        match owner {
            Owner::Fragment(id) => self.send(id, FragmentEvent::BecomeDirty),
            Owner::Record(id) => self.record_become_dirty(id),
        }
    }

    pub(crate) fn owner_property_was_reset(&mut self, owner: Owner, key: &str) -> Result<()> {
        self.emit(OwnerEvent {
            owner,
            kind: OwnerEventKind::PropertyWasReset {
                key: key.to_string(),
            },
        });
        match owner {
            Owner::Fragment(id) => self.send(id, FragmentEvent::PropertyWasReset),
            Owner::Record(id) => self.record_property_was_reset(id),
        }
    }

    fn record_become_dirty(&mut self, id: RecordId) -> Result<()> {
        let record = self.record_node_mut(id)?;
        if record.state == RecordState::Saved {
            record.state = RecordState::Updated;
            debug!(record = %id, "record became dirty");
        }
        Ok(())
    }

    fn record_property_was_reset(&mut self, id: RecordId) -> Result<()> {
        let dirty = self.owner_has_dirty_keys(Owner::Record(id));
        let suppress = self.options.suppress_reset_on_new_owner;
        let record = self.record_node_mut(id)?;
        match record.state {
            RecordState::Updated if !dirty => {
                record.state = RecordState::Saved;
                debug!(record = %id, "record is clean again");
            }
            RecordState::New if !dirty && !suppress => {
                record.state = RecordState::Deleted;
                debug!(record = %id, "new record has no changes left; discarded");
            }
            _ => {}
        }
        Ok(())
    }

    // ── State machine driver ─────────────────────────────────────────────

    /// Delivers `event` to a fragment's state machine and runs the result.
    pub(crate) fn send(&mut self, id: NodeId, event: FragmentEvent) -> Result<()> {
        let current = self.fragment_node(id)?.state;
        let action = state::resolve(current, event)
            .ok_or(FragmentError::UnhandledEvent { event, state: current })?;
        match action {
            Action::Stay => Ok(()),
            Action::TransitionTo(target) => self.transition(id, target),
            Action::TransitionIfClean(target) => {
                if self.owner_has_dirty_keys(Owner::Fragment(id)) {
                    Ok(())
                } else {
                    self.transition(id, target)
                }
            }
        }
    }

    fn transition(&mut self, id: NodeId, target: FragmentState) -> Result<()> {
        let node = self.fragment_node_mut(id)?;
        let from = node.state;
        if from == target {
            return Ok(());
        }
        node.state = target;
        debug!(node = %id, %from, to = %target, "fragment transition");
        match target.setup() {
            Setup::NotifyDirty => self.notify_owner_dirty(id),
            Setup::NotifyReset => self.notify_owner_reset(id),
            Setup::None => Ok(()),
        }
    }
}

fn check_link(existing: Option<&OwnerLink>, requested: &OwnerLink) -> Result<()> {
    match existing {
        Some(existing) if existing != requested => Err(FragmentError::OwnershipConflict {
            existing: existing.clone(),
            requested: Some(requested.clone()),
        }),
        _ => Ok(()),
    }
}
