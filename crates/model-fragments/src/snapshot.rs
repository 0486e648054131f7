//! Detached, read-only copies of a record tree.

use indexmap::IndexMap;
use model_fragments_schema::Scalar;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub model: String,
    /// Server id; always `None` for fragments.
    pub id: Option<String>,
    pub attributes: IndexMap<String, SnapshotValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Scalar(Scalar),
    Fragment(Box<Snapshot>),
    FragmentArray(Vec<Snapshot>),
    Array(Vec<Scalar>),
}

impl Snapshot {
    pub(crate) fn new(model: String, id: Option<String>) -> Self {
        Self {
            model,
            id,
            attributes: IndexMap::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&SnapshotValue> {
        self.attributes.get(name)
    }

    /// Nested snapshot of a fragment attribute.
    pub fn fragment(&self, name: &str) -> Option<&Snapshot> {
        match self.attr(name)? {
            SnapshotValue::Fragment(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (name, value) in &self.attributes {
            out.insert(name.clone(), value.to_json());
        }
        Value::Object(out)
    }
}

impl SnapshotValue {
    pub fn to_json(&self) -> Value {
        match self {
            SnapshotValue::Scalar(scalar) => scalar.to_json(),
            SnapshotValue::Fragment(snapshot) => snapshot.to_json(),
            SnapshotValue::FragmentArray(members) => {
                Value::Array(members.iter().map(Snapshot::to_json).collect())
            }
            SnapshotValue::Array(values) => Value::Array(values.iter().map(Scalar::to_json).collect()),
        }
    }
}
