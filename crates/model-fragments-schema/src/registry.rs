//! The schema registry.
//!
//! A registry is assembled once at startup through [`RegistryBuilder`] (or a
//! [`SchemaConfig`](crate::SchemaConfig) file) and then shared read-only with
//! every store. Building resolves `extends` chains, copies inherited
//! attributes into each model, validates attribute targets and fills the
//! closed variant table used for polymorphic hydration.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::schema::{AttributeDef, ModelBuilder, ModelKind, ModelSchema};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: IndexMap<String, ModelSchema>,
    /// base model -> discriminator -> concrete model
    variants: HashMap<String, IndexMap<String, String>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    pub fn model(&self, name: &str) -> Result<&ModelSchema, SchemaError> {
        self.models
            .get(name)
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }

    pub fn is_fragment(&self, name: &str) -> bool {
        self.models.get(name).is_some_and(ModelSchema::is_fragment)
    }

    pub fn attribute(&self, model: &str, name: &str) -> Option<&AttributeDef> {
        self.models.get(model)?.attribute(name)
    }

    /// Returns `true` when `model` is `ancestor` or extends it transitively.
    pub fn is_a(&self, model: &str, ancestor: &str) -> bool {
        let mut cursor = Some(model);
        while let Some(name) = cursor {
            if name == ancestor {
                return true;
            }
            cursor = self.models.get(name).and_then(|m| m.extends.as_deref());
        }
        false
    }

    /// Discriminators registered under `base`, in registration order.
    pub fn variants_of(&self, base: &str) -> impl Iterator<Item = (&str, &str)> {
        self.variants
            .get(base)
            .into_iter()
            .flat_map(|table| table.iter().map(|(d, m)| (d.as_str(), m.as_str())))
    }

    /// Resolves the concrete model a polymorphic payload should instantiate.
    ///
    /// Without a discriminator the declared model itself is used, provided it
    /// is concrete.
    pub fn resolve_variant(
        &self,
        declared: &str,
        discriminator: Option<&str>,
    ) -> Result<&ModelSchema, SchemaError> {
        let base = self.model(declared)?;
        let Some(discriminator) = discriminator else {
            if base.is_abstract {
                return Err(SchemaError::MissingTypeDiscriminator {
                    model: declared.to_string(),
                });
            }
            return Ok(base);
        };
        let concrete = self
            .variants
            .get(declared)
            .and_then(|table| table.get(discriminator))
            .ok_or_else(|| SchemaError::UnknownVariant {
                model: declared.to_string(),
                discriminator: discriminator.to_string(),
            })?;
        self.model(concrete)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    models: Vec<ModelBuilder>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: ModelBuilder) -> Self {
        self.models.push(model);
        self
    }

    pub fn record<F>(self, name: &str, define: F) -> Self
    where
        F: FnOnce(ModelBuilder) -> ModelBuilder,
    {
        self.model(define(ModelBuilder::new(name, ModelKind::Record)))
    }

    pub fn fragment<F>(self, name: &str, define: F) -> Self
    where
        F: FnOnce(ModelBuilder) -> ModelBuilder,
    {
        self.model(define(ModelBuilder::new(name, ModelKind::Fragment)))
    }

    pub fn build(self) -> Result<Registry, SchemaError> {
        let mut declared: IndexMap<String, ModelBuilder> = IndexMap::new();
        for model in self.models {
            if declared.contains_key(&model.name) {
                return Err(SchemaError::DuplicateModel(model.name));
            }
            declared.insert(model.name.clone(), model);
        }

        let mut models = IndexMap::new();
        for name in declared.keys() {
            let chain = inheritance_chain(&declared, name)?;
            let own = &declared[name];
            let mut attributes = IndexMap::new();
            // Root ancestor first so overrides in subclasses win.
            for ancestor in chain.iter().rev() {
                for (key, def) in &declared[ancestor.as_str()].attributes {
                    attributes.insert(key.clone(), def.clone());
                }
            }
            models.insert(
                name.clone(),
                ModelSchema {
                    name: name.clone(),
                    kind: own.kind,
                    extends: own.extends.clone(),
                    is_abstract: own.is_abstract,
                    discriminator: own.discriminator.clone().unwrap_or_else(|| name.clone()),
                    attributes,
                },
            );
        }

        let mut registry = Registry {
            models,
            variants: HashMap::new(),
        };
        registry.validate_attributes()?;
        registry.build_variant_table()?;
        tracing::debug!(models = registry.models.len(), "schema registry built");
        Ok(registry)
    }
}

fn inheritance_chain(
    declared: &IndexMap<String, ModelBuilder>,
    name: &str,
) -> Result<Vec<String>, SchemaError> {
    let mut chain = vec![name.to_string()];
    let mut seen = HashSet::from([name.to_string()]);
    let mut cursor = &declared[name];
    while let Some(parent) = cursor.extends.as_deref() {
        let next = declared
            .get(parent)
            .ok_or_else(|| SchemaError::UnknownParent {
                model: name.to_string(),
                parent: parent.to_string(),
            })?;
        if next.kind != cursor.kind {
            return Err(SchemaError::InvalidParent {
                model: cursor.name.clone(),
                parent: parent.to_string(),
                reason: "records and fragments cannot extend each other",
            });
        }
        if !seen.insert(parent.to_string()) {
            return Err(SchemaError::CyclicInheritance {
                model: name.to_string(),
            });
        }
        chain.push(parent.to_string());
        cursor = next;
    }
    Ok(chain)
}

impl Registry {
    fn validate_attributes(&self) -> Result<(), SchemaError> {
        for model in self.models.values() {
            for def in model.attributes.values() {
                let invalid = |reason: String| SchemaError::InvalidAttribute {
                    model: model.name.clone(),
                    name: def.name.clone(),
                    reason,
                };
                let Some(target) = def.kind.fragment_model() else {
                    if def.options.polymorphic {
                        return Err(invalid(format!(
                            "{} attributes cannot be polymorphic",
                            def.kind.as_str()
                        )));
                    }
                    continue;
                };
                let schema = self
                    .models
                    .get(target)
                    .ok_or_else(|| invalid(format!("unknown fragment model `{target}`")))?;
                if !schema.is_fragment() {
                    return Err(invalid(format!("`{target}` is not a fragment model")));
                }
                if schema.is_abstract && !def.options.polymorphic {
                    return Err(invalid(format!(
                        "abstract fragment `{target}` requires a polymorphic attribute"
                    )));
                }
                if def.options.type_key.is_empty() {
                    return Err(invalid("type key cannot be empty".to_string()));
                }
            }
        }
        Ok(())
    }

    fn build_variant_table(&mut self) -> Result<(), SchemaError> {
        let mut variants: HashMap<String, IndexMap<String, String>> = HashMap::new();
        for model in self.models.values().filter(|m| m.is_fragment()) {
            if model.is_abstract {
                continue;
            }
            let mut cursor = Some(model.name.as_str());
            while let Some(base) = cursor {
                let table = variants.entry(base.to_string()).or_default();
                if let Some(existing) = table.get(&model.discriminator) {
                    if existing != &model.name {
                        return Err(SchemaError::DuplicateDiscriminator {
                            model: base.to_string(),
                            discriminator: model.discriminator.clone(),
                        });
                    }
                }
                table.insert(model.discriminator.clone(), model.name.clone());
                cursor = self.models.get(base).and_then(|m| m.extends.as_deref());
            }
        }
        self.variants = variants;
        Ok(())
    }
}
