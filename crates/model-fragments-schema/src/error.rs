use serde_json::Value;
use thiserror::Error;

use crate::scalar::Transform;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown model `{0}`")]
    UnknownModel(String),
    #[error("model `{0}` is registered twice")]
    DuplicateModel(String),
    #[error("model `{model}` extends unknown model `{parent}`")]
    UnknownParent { model: String, parent: String },
    #[error("model `{model}` has a cyclic `extends` chain")]
    CyclicInheritance { model: String },
    #[error("model `{model}` cannot extend `{parent}`: {reason}")]
    InvalidParent {
        model: String,
        parent: String,
        reason: &'static str,
    },
    #[error("invalid attribute `{model}.{name}`: {reason}")]
    InvalidAttribute {
        model: String,
        name: String,
        reason: String,
    },
    #[error("discriminator `{discriminator}` is used twice under `{model}`")]
    DuplicateDiscriminator {
        model: String,
        discriminator: String,
    },
    #[error("payload for polymorphic `{model}` carries no type discriminator")]
    MissingTypeDiscriminator { model: String },
    #[error("no variant of `{model}` is registered for discriminator `{discriminator}`")]
    UnknownVariant {
        model: String,
        discriminator: String,
    },
    #[error("cannot convert {value} with the {transform} transform")]
    TransformMismatch { transform: Transform, value: Value },
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("schema config (json) parse failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema config (toml) parse failed: {0}")]
    Toml(#[from] toml::de::Error),
}
