use crate::ids::{NodeId, Owner};

/// One call into an owner's notification hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEvent {
    pub owner: Owner,
    pub kind: OwnerEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerEventKind {
    /// The node under `key` went from clean to dirty.
    FragmentDidDirty { key: String, child: NodeId },
    /// The node under `key` went from dirty to clean.
    FragmentDidReset { key: String, child: NodeId },
    BecomeDirty,
    PropertyWasReset { key: String },
}

impl OwnerEvent {
    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            OwnerEventKind::FragmentDidDirty { key, .. }
            | OwnerEventKind::FragmentDidReset { key, .. }
            | OwnerEventKind::PropertyWasReset { key } => Some(key),
            OwnerEventKind::BecomeDirty => None,
        }
    }
}
