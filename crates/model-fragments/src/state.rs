//! Fragment lifecycle state machine.
//!
//! States form a tree; a state that has no handler for an event delegates to
//! its parent:
//!
//! ```text
//! root
//! ├── empty
//! ├── loading
//! └── loaded
//!     ├── saved
//!     ├── created
//!     └── updated
//! ```
//!
//! Handlers never touch the store themselves. [`resolve`] returns an
//! [`Action`] which the store executes, and [`FragmentState::setup`] names the
//! owner notification a state performs on entry.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentState {
    Root,
    Empty,
    Loading,
    Loaded,
    LoadedSaved,
    LoadedCreated,
    LoadedUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentEvent {
    /// Data supplied locally (created through a factory).
    LoadedData,
    /// Data supplied by the persistence layer.
    PushedData,
    WillLoad,
    LoadingFailed,
    BecomeDirty,
    PropertyWasReset,
    RolledBack,
    DidCommit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFlag {
    IsEmpty,
    IsLoading,
    IsLoaded,
    IsDirty,
    IsNew,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stay,
    TransitionTo(FragmentState),
    /// Transition only when no attribute of the fragment is dirty any more.
    TransitionIfClean(FragmentState),
}

/// Owner notification performed when a state is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    None,
    NotifyDirty,
    NotifyReset,
}

impl FragmentState {
    pub fn parent(self) -> Option<FragmentState> {
        match self {
            Self::Root => None,
            Self::Empty | Self::Loading | Self::Loaded => Some(Self::Root),
            Self::LoadedSaved | Self::LoadedCreated | Self::LoadedUpdated => Some(Self::Loaded),
        }
    }

    /// Abstract states only exist to carry shared handlers.
    pub fn is_concrete(self) -> bool {
        !matches!(self, Self::Root | Self::Loaded)
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Empty => "root.empty",
            Self::Loading => "root.loading",
            Self::Loaded => "root.loaded",
            Self::LoadedSaved => "root.loaded.saved",
            Self::LoadedCreated => "root.loaded.created",
            Self::LoadedUpdated => "root.loaded.updated",
        }
    }

    fn own_flag(self, flag: StateFlag) -> Option<bool> {
        use StateFlag::*;
        match (self, flag) {
            (Self::Root, _) => Some(false),
            (Self::Empty, IsEmpty) => Some(true),
            (Self::Loading, IsLoading) => Some(true),
            (Self::Loaded, IsLoaded) => Some(true),
            (Self::LoadedCreated, IsDirty | IsNew) => Some(true),
            (Self::LoadedUpdated, IsDirty) => Some(true),
            _ => None,
        }
    }

    pub fn flag(self, flag: StateFlag) -> bool {
        let mut cursor = Some(self);
        while let Some(state) = cursor {
            if let Some(value) = state.own_flag(flag) {
                return value;
            }
            cursor = state.parent();
        }
        false
    }

    pub fn is_empty(self) -> bool {
        self.flag(StateFlag::IsEmpty)
    }

    pub fn is_loading(self) -> bool {
        self.flag(StateFlag::IsLoading)
    }

    pub fn is_loaded(self) -> bool {
        self.flag(StateFlag::IsLoaded)
    }

    pub fn is_dirty(self) -> bool {
        self.flag(StateFlag::IsDirty)
    }

    pub fn is_new(self) -> bool {
        self.flag(StateFlag::IsNew)
    }

    fn own_handler(self, event: FragmentEvent) -> Option<Action> {
        use FragmentEvent::*;
        match (self, event) {
            (Self::Root, BecomeDirty | PropertyWasReset | RolledBack) => Some(Action::Stay),

            (Self::Empty, LoadedData) => Some(Action::TransitionTo(Self::LoadedCreated)),
            (Self::Empty, PushedData) => Some(Action::TransitionTo(Self::LoadedSaved)),
            (Self::Empty, WillLoad) => Some(Action::TransitionTo(Self::Loading)),

            (Self::Loading, PushedData) => Some(Action::TransitionTo(Self::LoadedSaved)),
            (Self::Loading, LoadingFailed) => Some(Action::TransitionTo(Self::Empty)),

            (Self::Loaded, PushedData | DidCommit) => {
                Some(Action::TransitionTo(Self::LoadedSaved))
            }

            (Self::LoadedSaved, PushedData) => Some(Action::Stay),
            (Self::LoadedSaved, BecomeDirty) => Some(Action::TransitionTo(Self::LoadedUpdated)),

            (Self::LoadedUpdated, RolledBack) => Some(Action::TransitionTo(Self::LoadedSaved)),
            (Self::LoadedUpdated, PropertyWasReset) => {
                Some(Action::TransitionIfClean(Self::LoadedSaved))
            }

            _ => None,
        }
    }

    pub fn setup(self) -> Setup {
        match self {
            Self::LoadedSaved => Setup::NotifyReset,
            Self::LoadedCreated | Self::LoadedUpdated => Setup::NotifyDirty,
            _ => Setup::None,
        }
    }
}

impl fmt::Display for FragmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Looks the event up on `state`, then on each ancestor.
pub fn resolve(state: FragmentState, event: FragmentEvent) -> Option<Action> {
    let mut cursor = Some(state);
    while let Some(current) = cursor {
        if let Some(action) = current.own_handler(event) {
            return Some(action);
        }
        cursor = current.parent();
    }
    None
}
