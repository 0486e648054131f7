//! File-based schema configuration.
//!
//! The same document shape is accepted as JSON or TOML:
//!
//! ```toml
//! [[models]]
//! name = "name"
//! kind = "fragment"
//!
//! [models.attributes.first]
//! kind = "attr"
//! type = "string"
//!
//! [[models]]
//! name = "person"
//! kind = "record"
//!
//! [models.attributes.name]
//! kind = "fragment"
//! type = "name"
//!
//! [models.attributes.titles]
//! kind = "array"
//! type = "string"
//! default = ["Ser"]
//! ```

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaError;
use crate::registry::{Registry, RegistryBuilder};
use crate::scalar::Transform;
use crate::schema::{
    AttributeDef, AttributeKind, AttributeOptions, ModelBuilder, ModelKind, DEFAULT_TYPE_KEY,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub name: String,
    pub kind: ModelKind,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeKindConfig {
    Attr,
    Fragment,
    FragmentArray,
    Array,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    pub kind: AttributeKindConfig,
    /// Transform name for `attr`/`array`, model name for fragment kinds.
    #[serde(default, rename = "type")]
    pub target: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub polymorphic: bool,
    #[serde(default)]
    pub type_key: Option<String>,
}

impl SchemaConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn into_builder(self) -> Result<RegistryBuilder, SchemaError> {
        let mut builder = RegistryBuilder::new();
        for model in self.models {
            builder = builder.model(model.into_builder()?);
        }
        Ok(builder)
    }

    pub fn build(self) -> Result<Registry, SchemaError> {
        self.into_builder()?.build()
    }
}

impl ModelConfig {
    fn into_builder(self) -> Result<ModelBuilder, SchemaError> {
        let mut model = ModelBuilder::new(self.name.clone(), self.kind);
        if let Some(parent) = self.extends {
            model = model.extends(parent);
        }
        if self.is_abstract {
            model = model.abstract_model();
        }
        if let Some(discriminator) = self.discriminator {
            model = model.discriminator(discriminator);
        }
        for (name, attr) in self.attributes {
            let def = attr.into_def(&self.name, &name)?;
            model = model.attribute(def);
        }
        Ok(model)
    }
}

impl AttributeConfig {
    fn into_def(self, model: &str, name: &str) -> Result<AttributeDef, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidAttribute {
            model: model.to_string(),
            name: name.to_string(),
            reason,
        };
        let transform = |target: Option<&str>| -> Result<Option<Transform>, SchemaError> {
            match target {
                None => Ok(None),
                Some(t) => Transform::parse(t)
                    .map(Some)
                    .ok_or_else(|| invalid(format!("unknown transform `{t}`"))),
            }
        };
        let kind = match self.kind {
            AttributeKindConfig::Attr => {
                AttributeKind::Attr(transform(self.target.as_deref())?.unwrap_or_default())
            }
            AttributeKindConfig::Array => AttributeKind::Array(transform(self.target.as_deref())?),
            AttributeKindConfig::Fragment => AttributeKind::Fragment(
                self.target
                    .clone()
                    .ok_or_else(|| invalid("fragment attributes need a `type`".to_string()))?,
            ),
            AttributeKindConfig::FragmentArray => AttributeKind::FragmentArray(
                self.target
                    .clone()
                    .ok_or_else(|| invalid("fragment arrays need a `type`".to_string()))?,
            ),
        };
        let options = AttributeOptions {
            default_value: self.default,
            polymorphic: self.polymorphic,
            type_key: self.type_key.unwrap_or_else(|| DEFAULT_TYPE_KEY.to_string()),
        };
        Ok(AttributeDef::new(name, kind).with_options(options))
    }
}

impl Registry {
    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        SchemaConfig::from_json_str(raw)?.build()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SchemaError> {
        SchemaConfig::from_toml_str(raw)?.build()
    }
}
