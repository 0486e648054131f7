use model_fragments_schema::SchemaError;
use thiserror::Error;

use crate::ids::{NodeId, OwnerLink, RecordId};
use crate::record::RecordState;
use crate::state::{FragmentEvent, FragmentState};

#[derive(Debug, Error)]
pub enum FragmentError {
    /// `requested` is `None` when the target is an unowned fragment array.
    #[error("node is owned by {existing}; cannot attach it elsewhere")]
    OwnershipConflict {
        existing: OwnerLink,
        requested: Option<OwnerLink>,
    },
    #[error("attaching {0} there would make it its own ancestor")]
    CyclicOwnership(NodeId),
    #[error("`{0}` is not a fragment type")]
    InvalidFragmentType(String),
    #[error("`{name}` is not an attribute of `{model}`")]
    UnknownAttribute { model: String, name: String },
    #[error("payload for polymorphic `{model}` is missing the `{key}` discriminator")]
    MissingTypeDiscriminator { model: String, key: String },
    #[error("no variant of `{model}` is registered for discriminator `{discriminator}`")]
    UnknownVariant {
        model: String,
        discriminator: String,
    },
    #[error("fragment {0} is not a member of this array")]
    NotAMember(NodeId),
    #[error("expected a `{expected}` fragment, got `{actual}`")]
    WrongFragmentType { expected: String, actual: String },
    #[error("attribute `{name}` expects {expected}, got {actual}")]
    AttributeKindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("invalid payload for `{name}`: {reason}")]
    InvalidPayload { name: String, reason: String },
    #[error("event {event:?} is not handled in state {state}")]
    UnhandledEvent {
        event: FragmentEvent,
        state: FragmentState,
    },
    #[error("{0} does not exist")]
    NodeNotFound(NodeId),
    #[error("{id} is not {expected}")]
    WrongNodeKind { id: NodeId, expected: &'static str },
    #[error("{0} does not exist")]
    RecordNotFound(RecordId),
    #[error("`{0}` is not a record type")]
    InvalidRecordType(String),
    #[error("record `{model}` with id `{id}` is already loaded")]
    DuplicateRecord { model: String, id: String },
    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("cannot {action} a record in state {state:?}")]
    InvalidRecordState {
        state: RecordState,
        action: &'static str,
    },
    #[error("fragment store invariant violation: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Schema(SchemaError),
}

impl From<SchemaError> for FragmentError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnknownVariant {
                model,
                discriminator,
            } => FragmentError::UnknownVariant {
                model,
                discriminator,
            },
            other => FragmentError::Schema(other),
        }
    }
}

pub type Result<T, E = FragmentError> = std::result::Result<T, E>;
