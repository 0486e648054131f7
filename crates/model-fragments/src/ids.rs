use std::fmt;

/// Arena id of a fragment, fragment array or primitive array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

/// Arena id of a top-level record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl RecordId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}", self.0)
    }
}

/// Anything that can hold attributes, and therefore own nested nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Record(RecordId),
    Fragment(NodeId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Record(id) => id.fmt(f),
            Owner::Fragment(id) => id.fmt(f),
        }
    }
}

impl From<RecordId> for Owner {
    fn from(id: RecordId) -> Self {
        Owner::Record(id)
    }
}

/// Non-owning back reference from a node to the property it occupies.
///
/// Members of a fragment array carry the array's link, not a link to the
/// array node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerLink {
    pub owner: Owner,
    pub key: String,
}

impl OwnerLink {
    pub fn new(owner: Owner, key: impl Into<String>) -> Self {
        Self {
            owner,
            key: key.into(),
        }
    }
}

impl fmt::Display for OwnerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.key)
    }
}
