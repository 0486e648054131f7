//! Schema layer for model-fragments.
//!
//! Declares which models exist, which of them are fragments, what attributes
//! each carries and how primitive values are transformed. A [`Registry`] is
//! built once and injected into every store.
//!
//! # Example
//!
//! ```
//! use model_fragments_schema::{AttributeOptions, Registry, Transform};
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .fragment("name", |m| m.attr("first", Transform::String).attr("last", Transform::String))
//!     .record("person", |m| {
//!         m.fragment("name", "name").array_with(
//!             "titles",
//!             Some(Transform::String),
//!             AttributeOptions::default().with_default(json!(["Ser"])),
//!         )
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.is_fragment("name"));
//! assert!(!registry.is_fragment("person"));
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod scalar;
pub mod schema;

pub use config::{AttributeConfig, AttributeKindConfig, ModelConfig, SchemaConfig};
pub use error::SchemaError;
pub use registry::{Registry, RegistryBuilder};
pub use scalar::{Scalar, Transform};
pub use schema::{
    AttributeDef, AttributeKind, AttributeOptions, ModelBuilder, ModelKind, ModelSchema,
    DEFAULT_TYPE_KEY,
};
