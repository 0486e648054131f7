//! Nested fragment attributes for model records.
//!
//! A fragment is an owned sub-object of a record (or of another fragment)
//! with its own dirty tracking. Changing a value anywhere in the tree marks
//! every owner up to the record dirty; rolling back at any level, or setting
//! the value back, makes them clean again. Commit and rollback work on whole
//! trees.
//!
//! The crate is organised around a [`Store`] arena:
//!
//! - records and nodes live in flat tables and point at their owner through
//!   an [`OwnerLink`];
//! - fragment lifecycle is a hierarchical state machine ([`state`]);
//! - [`FragmentHandle`], [`FragmentArrayHandle`], [`ArrayHandle`] and
//!   [`RecordHandle`] are the mutation surface;
//! - [`Store::on_change`] observes the notifications owners receive.

pub mod error;
pub mod events;
pub mod ids;
mod nodes;
pub mod record;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod value;

pub use error::{FragmentError, Result};
pub use events::{OwnerEvent, OwnerEventKind};
pub use ids::{NodeId, Owner, OwnerLink, RecordId};
pub use record::RecordState;
pub use snapshot::{Snapshot, SnapshotValue};
pub use state::{FragmentEvent, FragmentState};
pub use store::{
    ArrayHandle, ChangedAttributes, FragmentArrayHandle, FragmentHandle, RecordHandle, Store,
    StoreOptions,
};
pub use value::AttrValue;

pub use model_fragments_schema as schema;
pub use model_fragments_schema::{
    AttributeDef, AttributeKind, AttributeOptions, ModelKind, Registry, RegistryBuilder, Scalar,
    SchemaError, Transform,
};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
