//! Entries of a result sequence.

use std::borrow::Cow;
use std::fmt;

use crate::id::ObjectId;
use crate::value::Value;

/// One entry of an evaluated sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A scene object.
    Object(ObjectId),
    /// A derived value that need not name a scene object (`cast` output).
    Value(Value),
    /// A scene object with a derived value (named projections).
    Pair(ObjectId, Value),
}

impl Item {
    /// The scene object this item refers to, if any.
    #[must_use]
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Object(id) | Self::Pair(id, _) => Some(id),
            Self::Value(_) => None,
        }
    }

    /// The derived value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) | Self::Pair(_, v) => Some(v),
            Self::Object(_) => None,
        }
    }

    /// Name used by name filters: the leaf name of an object, or the
    /// rendered value for plain values.
    #[must_use]
    pub fn leaf_name(&self) -> Cow<'_, str> {
        match self {
            Self::Object(id) | Self::Pair(id, _) => Cow::Borrowed(id.leaf_name()),
            Self::Value(v) => Cow::Owned(v.to_string()),
        }
    }

    /// Identity key for set algebra, de-duplication and sorting.
    ///
    /// Objects and pairs key on their identifier, so a pair and the bare
    /// object it came from compare equal. Plain values never equal an
    /// object, nor a value of another kind.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        match self {
            Self::Object(id) | Self::Pair(id, _) => ItemKey::Object(id.clone()),
            Self::Value(v) => ItemKey::Value {
                kind: v.kind(),
                text: v.to_string(),
            },
        }
    }
}

/// See [`Item::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    Object(ObjectId),
    Value { kind: &'static str, text: String },
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(id) => write!(f, "{id}"),
            Self::Value { text, .. } => f.write_str(text),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(id) => write!(f, "{id}"),
            Self::Value(v) => write!(f, "{v}"),
            Self::Pair(id, v) => write!(f, "{id}: {v}"),
        }
    }
}

impl From<ObjectId> for Item {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<(ObjectId, Value)> for Item {
    fn from((id, value): (ObjectId, Value)) -> Self {
        Self::Pair(id, value)
    }
}

impl PartialEq<&str> for Item {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::Object(id) if id.as_str() == *other)
    }
}
