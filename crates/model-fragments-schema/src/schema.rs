//! Model and attribute definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scalar::Transform;

/// Discriminator key used by polymorphic attributes when none is configured.
pub const DEFAULT_TYPE_KEY: &str = "type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Top-level record.
    Record,
    /// Nested fragment, only ever reachable through an owner.
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    /// Primitive attribute read through a transform.
    Attr(Transform),
    /// Single nested fragment of the named model.
    Fragment(String),
    /// Ordered list of fragments of the named model.
    FragmentArray(String),
    /// Ordered list of primitives, optionally typed.
    Array(Option<Transform>),
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attr(_) => "attr",
            Self::Fragment(_) => "fragment",
            Self::FragmentArray(_) => "fragment-array",
            Self::Array(_) => "array",
        }
    }

    /// Declared fragment model for `fragment` and `fragment-array` kinds.
    pub fn fragment_model(&self) -> Option<&str> {
        match self {
            Self::Fragment(model) | Self::FragmentArray(model) => Some(model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeOptions {
    /// Payload used when a hydrated record or fragment has no value for the key.
    pub default_value: Option<Value>,
    pub polymorphic: bool,
    pub type_key: String,
}

impl Default for AttributeOptions {
    fn default() -> Self {
        Self {
            default_value: None,
            polymorphic: false,
            type_key: DEFAULT_TYPE_KEY.to_string(),
        }
    }
}

impl AttributeOptions {
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    pub fn type_key(mut self, key: impl Into<String>) -> Self {
        self.type_key = key.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeKind,
    pub options: AttributeOptions,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            options: AttributeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AttributeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_polymorphic(&self) -> bool {
        self.options.polymorphic
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    pub name: String,
    pub kind: ModelKind,
    pub extends: Option<String>,
    pub is_abstract: bool,
    /// Value written under a polymorphic attribute's type key for this model.
    pub discriminator: String,
    /// Resolved attributes, inherited ones first.
    pub attributes: IndexMap<String, AttributeDef>,
}

impl ModelSchema {
    pub fn is_fragment(&self) -> bool {
        self.kind == ModelKind::Fragment
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

/// Fluent definition of one model, consumed by
/// [`RegistryBuilder`](crate::RegistryBuilder).
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pub(crate) name: String,
    pub(crate) kind: ModelKind,
    pub(crate) extends: Option<String>,
    pub(crate) is_abstract: bool,
    pub(crate) discriminator: Option<String>,
    pub(crate) attributes: IndexMap<String, AttributeDef>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            extends: None,
            is_abstract: false,
            discriminator: None,
            attributes: IndexMap::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    pub fn attribute(mut self, def: AttributeDef) -> Self {
        self.attributes.insert(def.name.clone(), def);
        self
    }

    pub fn attr(self, name: &str, transform: Transform) -> Self {
        self.attribute(AttributeDef::new(name, AttributeKind::Attr(transform)))
    }

    pub fn attr_with(self, name: &str, transform: Transform, options: AttributeOptions) -> Self {
        self.attribute(AttributeDef::new(name, AttributeKind::Attr(transform)).with_options(options))
    }

    pub fn fragment(self, name: &str, model: &str) -> Self {
        self.attribute(AttributeDef::new(name, AttributeKind::Fragment(model.into())))
    }

    pub fn fragment_with(self, name: &str, model: &str, options: AttributeOptions) -> Self {
        self.attribute(
            AttributeDef::new(name, AttributeKind::Fragment(model.into())).with_options(options),
        )
    }

    pub fn fragment_array(self, name: &str, model: &str) -> Self {
        self.attribute(AttributeDef::new(
            name,
            AttributeKind::FragmentArray(model.into()),
        ))
    }

    pub fn fragment_array_with(self, name: &str, model: &str, options: AttributeOptions) -> Self {
        self.attribute(
            AttributeDef::new(name, AttributeKind::FragmentArray(model.into()))
                .with_options(options),
        )
    }

    pub fn array(self, name: &str, item: Option<Transform>) -> Self {
        self.attribute(AttributeDef::new(name, AttributeKind::Array(item)))
    }

    pub fn array_with(self, name: &str, item: Option<Transform>, options: AttributeOptions) -> Self {
        self.attribute(AttributeDef::new(name, AttributeKind::Array(item)).with_options(options))
    }
}
