//! Arena node types.
//!
//! | node             | committed state     | current state          |
//! |------------------|---------------------|------------------------|
//! | `FragmentNode`   | `attrs.data`        | `data` + `attributes`  |
//! | `FragmentArray`  | `items.original`    | `items.current`        |
//! | `PrimitiveArray` | `items.original`    | `items.current`        |

use indexmap::IndexMap;
use model_fragments_schema::{AttributeOptions, Scalar, Transform};

use crate::error::{FragmentError, Result};
use crate::ids::{NodeId, OwnerLink};
use crate::state::FragmentState;
use crate::value::AttrValue;

// ── AttrTable ─────────────────────────────────────────────────────────────

/// Committed attribute values plus the uncommitted assignments on top.
///
/// `attributes` only ever holds keys whose value differs from `data`.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttrTable {
    pub(crate) data: IndexMap<String, AttrValue>,
    pub(crate) attributes: IndexMap<String, AttrValue>,
}

impl AttrTable {
    pub(crate) fn current(&self, key: &str) -> &AttrValue {
        self.attributes
            .get(key)
            .or_else(|| self.data.get(key))
            .unwrap_or(&AttrValue::NULL)
    }

    pub(crate) fn committed(&self, key: &str) -> &AttrValue {
        self.data.get(key).unwrap_or(&AttrValue::NULL)
    }

    /// Records an assignment. Returns `true` when it is now pending, `false`
    /// when it matches the committed value.
    pub(crate) fn assign(&mut self, key: &str, value: AttrValue) -> bool {
        if self.committed(key) == &value {
            self.attributes.shift_remove(key);
            false
        } else {
            self.attributes.insert(key.to_string(), value);
            true
        }
    }

    pub(crate) fn is_pending(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &String> {
        self.data
            .keys()
            .chain(self.attributes.keys().filter(|k| !self.data.contains_key(*k)))
    }

    /// Folds pending assignments into the committed data.
    pub(crate) fn commit(&mut self) {
        for (key, value) in std::mem::take(&mut self.attributes) {
            self.data.insert(key, value);
        }
    }

    /// Drops pending assignments, returning the discarded values.
    pub(crate) fn discard(&mut self) -> Vec<AttrValue> {
        std::mem::take(&mut self.attributes).into_values().collect()
    }
}

// ── StatefulArray ─────────────────────────────────────────────────────────

/// Ordered sequence with a committed snapshot.
#[derive(Debug, Clone)]
pub(crate) struct StatefulArray<T> {
    pub(crate) original: Vec<T>,
    pub(crate) current: Vec<T>,
    /// Dirtiness last reported to the owner.
    pub(crate) reported_dirty: bool,
}

impl<T: Clone + PartialEq> StatefulArray<T> {
    pub(crate) fn new(values: Vec<T>) -> Self {
        Self {
            original: values.clone(),
            current: values,
            reported_dirty: false,
        }
    }

    pub(crate) fn setup(&mut self, values: Vec<T>) {
        self.original = values.clone();
        self.current = values;
        self.reported_dirty = false;
    }

    /// Membership or order differs from the committed snapshot.
    pub(crate) fn changed(&self) -> bool {
        self.current != self.original
    }

    pub(crate) fn commit(&mut self) {
        self.original = self.current.clone();
    }

    pub(crate) fn rollback(&mut self) {
        self.current = self.original.clone();
    }

    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.current.get(index)
    }

    pub(crate) fn position(&self, item: &T) -> Option<usize> {
        self.current.iter().position(|x| x == item)
    }

    fn check_bounds(&self, index: usize, inclusive: bool) -> Result<()> {
        let len = self.current.len();
        let ok = if inclusive { index <= len } else { index < len };
        if ok {
            Ok(())
        } else {
            Err(FragmentError::IndexOutOfBounds { index, len })
        }
    }

    /// `Array#splice`: removes `delete_count` items at `start` and inserts
    /// `items` in their place.
    pub(crate) fn replace(
        &mut self,
        start: usize,
        delete_count: usize,
        items: Vec<T>,
    ) -> Result<Vec<T>> {
        self.check_bounds(start, true)?;
        let end = start.saturating_add(delete_count).min(self.current.len());
        Ok(self.current.splice(start..end, items).collect())
    }

    pub(crate) fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_bounds(from, false)?;
        self.check_bounds(to, false)?;
        let item = self.current.remove(from);
        self.current.insert(to, item);
        Ok(())
    }

    pub(crate) fn set_objects(&mut self, items: Vec<T>) -> Vec<T> {
        std::mem::replace(&mut self.current, items)
    }
}

// ── Nodes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct FragmentNode {
    pub(crate) model: String,
    pub(crate) link: Option<OwnerLink>,
    pub(crate) state: FragmentState,
    pub(crate) attrs: AttrTable,
}

#[derive(Debug, Clone)]
pub(crate) struct FragmentArrayNode {
    /// Declared member model.
    pub(crate) model: String,
    /// Polymorphism settings of the attribute the array was created for.
    pub(crate) options: AttributeOptions,
    pub(crate) link: Option<OwnerLink>,
    pub(crate) items: StatefulArray<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) struct PrimitiveArrayNode {
    pub(crate) item: Option<Transform>,
    pub(crate) link: Option<OwnerLink>,
    pub(crate) items: StatefulArray<Scalar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Fragment,
    FragmentArray,
    PrimitiveArray,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Fragment(FragmentNode),
    FragmentArray(FragmentArrayNode),
    PrimitiveArray(PrimitiveArrayNode),
}

impl Node {
    pub(crate) fn link(&self) -> Option<&OwnerLink> {
        match self {
            Node::Fragment(n) => n.link.as_ref(),
            Node::FragmentArray(n) => n.link.as_ref(),
            Node::PrimitiveArray(n) => n.link.as_ref(),
        }
    }

    pub(crate) fn set_link(&mut self, link: Option<OwnerLink>) {
        match self {
            Node::Fragment(n) => n.link = link,
            Node::FragmentArray(n) => n.link = link,
            Node::PrimitiveArray(n) => n.link = link,
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Node::Fragment(_) => NodeKind::Fragment,
            Node::FragmentArray(_) => NodeKind::FragmentArray,
            Node::PrimitiveArray(_) => NodeKind::PrimitiveArray,
        }
    }
}
