use model_fragments_schema::Scalar;

use crate::ids::NodeId;

/// Content of one attribute slot on a record or fragment.
///
/// Nested values are referenced by id; two slots are equal only when they
/// point at the same node, never by deep comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Scalar(Scalar),
    Fragment(NodeId),
    FragmentArray(NodeId),
    Array(NodeId),
}

impl AttrValue {
    pub const NULL: AttrValue = AttrValue::Scalar(Scalar::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Scalar(Scalar::Null))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            AttrValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fragment(&self) -> Option<NodeId> {
        match self {
            AttrValue::Fragment(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_fragment_array(&self) -> Option<NodeId> {
        match self {
            AttrValue::FragmentArray(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<NodeId> {
        match self {
            AttrValue::Array(id) => Some(*id),
            _ => None,
        }
    }

    /// Node referenced by the slot, whatever its kind.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            AttrValue::Fragment(id) | AttrValue::FragmentArray(id) | AttrValue::Array(id) => {
                Some(*id)
            }
            AttrValue::Scalar(_) => None,
        }
    }

    /// Same slot kind, pointing at `id` instead.
    pub(crate) fn rebind(&self, id: NodeId) -> AttrValue {
        match self {
            AttrValue::Fragment(_) => AttrValue::Fragment(id),
            AttrValue::FragmentArray(_) => AttrValue::FragmentArray(id),
            AttrValue::Array(_) => AttrValue::Array(id),
            AttrValue::Scalar(s) => AttrValue::Scalar(s.clone()),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Scalar(_) => "a scalar",
            AttrValue::Fragment(_) => "a fragment",
            AttrValue::FragmentArray(_) => "a fragment array",
            AttrValue::Array(_) => "an array",
        }
    }
}

impl Default for AttrValue {
    fn default() -> Self {
        AttrValue::NULL
    }
}

impl From<Scalar> for AttrValue {
    fn from(value: Scalar) -> Self {
        AttrValue::Scalar(value)
    }
}

macro_rules! scalar_into_attr {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttrValue {
                fn from(value: $ty) -> Self {
                    AttrValue::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

scalar_into_attr!(&str, String, bool, i32, i64, u64, f64);
