use std::fmt;

use crate::nodes::AttrTable;

/// Lifecycle of a top-level record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Created locally, never persisted.
    New,
    Saved,
    Updated,
    /// A save is outstanding; `was_new` remembers where to return on failure.
    InFlight { was_new: bool },
    Deleted,
}

impl RecordState {
    pub fn is_new(self) -> bool {
        matches!(self, Self::New | Self::InFlight { was_new: true })
    }

    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }

    pub fn is_saving(self) -> bool {
        matches!(self, Self::InFlight { .. })
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Saved => "saved",
            Self::Updated => "updated",
            Self::InFlight { .. } => "in-flight",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordNode {
    pub(crate) model: String,
    pub(crate) id: Option<String>,
    pub(crate) state: RecordState,
    /// Dirtiness at the moment a save started, reported while in flight.
    pub(crate) dirty_before_save: bool,
    pub(crate) attrs: AttrTable,
}
