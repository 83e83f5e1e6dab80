//! Scene object identifiers and type sets.
//!
//! Identifiers are path-like strings handed out by the host. A fully-qualified
//! path uses `|` as separator (`|world|body|bodyShape`); the final segment is
//! the object's leaf name.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Separator between path segments in a fully-qualified identifier.
pub const PATH_SEPARATOR: char = '|';

/// Opaque identifier of a scene object.
///
/// Cloning is cheap; the path is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Arc<str>);

impl ObjectId {
    #[must_use]
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    /// The full identifier as handed out by the provider.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment.
    ///
    /// `|world|body|bodyShape` has leaf name `bodyShape`; an identifier without
    /// separators is its own leaf name.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        self.0.rsplit(PATH_SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Whether this identifier is a fully-qualified path.
    #[must_use]
    pub fn is_full_path(&self) -> bool {
        self.0.starts_with(PATH_SEPARATOR)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ObjectId {
    fn from(path: String) -> Self {
        Self(Arc::from(path))
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// An ordered, duplicate-free set of host type names.
///
/// Most queries name one or two types, so the names live inline.
/// An empty set means "any type" when handed to [`SceneProvider::enumerate`].
///
/// [`SceneProvider::enumerate`]: crate::SceneProvider::enumerate
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeSet {
    names: SmallVec<[Arc<str>; 2]>,
}

impl TypeSet {
    /// The empty set ("any type").
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a set from type names, dropping duplicates but keeping first-seen order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for name in names {
            set.insert(name.as_ref());
        }
        set
    }

    /// Add a type name. Returns `false` if it was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.push(Arc::from(name));
        true
    }

    /// Union in place, keeping `self`'s names first.
    pub fn extend_from(&mut self, other: &TypeSet) {
        for name in other.iter() {
            self.insert(name);
        }
    }

    #[must_use]
    pub fn union(&self, other: &TypeSet) -> TypeSet {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| &**n == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| &**n)
    }
}

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(name)?;
        }
        Ok(())
    }
}

impl<S: AsRef<str>> FromIterator<S> for TypeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_names(iter)
    }
}
