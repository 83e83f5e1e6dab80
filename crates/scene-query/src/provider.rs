//! The capability surface the engine needs from a host application.
//!
//! The engine never talks to the host directly; an evaluator is handed a
//! `&dyn SceneProvider` and every native call goes through it. All calls are
//! blocking queries against live state. Providers must not cache between calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::id::{ObjectId, TypeSet};
use crate::value::{Value, Vec3};

/// Attribute read by the default [`SceneProvider::world_positions`].
pub const WORLD_POSITION_ATTRIBUTE: &str = "worldPosition";

/// Which relatives a batched [`SceneProvider::relatives`] call lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeKind {
    /// Direct parents.
    Parent,
    /// Direct children.
    Child,
    /// Direct children that are shapes.
    Shape,
    /// Direct children that have no children of their own.
    Leaf,
    /// All descendants, depth first.
    Descendant,
}

impl fmt::Display for RelativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parent => "parents",
            Self::Child => "children",
            Self::Shape => "shapes",
            Self::Leaf => "leaves",
            Self::Descendant => "descendants",
        })
    }
}

/// Primitive scene operations supplied by the host.
///
/// Every method that takes a slice of identifiers is a single batched host
/// call; the engine never loops over items calling these one by one.
pub trait SceneProvider {
    /// List objects, optionally restricted to `types` (empty means any type)
    /// and to a glob-style name `pattern`.
    ///
    /// Returns an empty vector, not an error, when nothing matches.
    fn enumerate(&self, types: &TypeSet, pattern: Option<&str>) -> ProviderResult<Vec<ObjectId>>;

    /// List relatives of every object in `ids`, in one call.
    ///
    /// With `full_path` the returned identifiers are fully qualified.
    fn relatives(
        &self,
        ids: &[ObjectId],
        kind: RelativeKind,
        full_path: bool,
    ) -> ProviderResult<Vec<ObjectId>>;

    /// List upstream dependency history of every object in `ids`, in one call.
    fn history(&self, ids: &[ObjectId]) -> ProviderResult<Vec<ObjectId>>;

    /// List downstream dependents of every object in `ids`, in one call.
    fn future(&self, ids: &[ObjectId]) -> ProviderResult<Vec<ObjectId>> {
        let _ = ids;
        Err(ProviderError::Unsupported("future"))
    }

    /// Read one attribute.
    ///
    /// Fails with [`ProviderError::AttributeNotFound`] when the attribute does
    /// not exist or cannot be read.
    fn get_attribute(&self, id: &ObjectId, attribute: &str) -> ProviderResult<Value>;

    /// World-space position of every object in `ids`, in input order.
    ///
    /// The default reads [`WORLD_POSITION_ATTRIBUTE`] per object; hosts with a
    /// batched transform query should override it.
    fn world_positions(&self, ids: &[ObjectId]) -> ProviderResult<Vec<Vec3>> {
        ids.iter()
            .map(|id| {
                let value = self.get_attribute(id, WORLD_POSITION_ATTRIBUTE)?;
                value
                    .as_vector()
                    .ok_or_else(|| ProviderError::AttributeNotFound {
                        object: id.clone(),
                        attribute: WORLD_POSITION_ATTRIBUTE.to_owned(),
                    })
            })
            .collect()
    }
}

impl<P: SceneProvider + ?Sized> SceneProvider for &P {
    fn enumerate(&self, types: &TypeSet, pattern: Option<&str>) -> ProviderResult<Vec<ObjectId>> {
        (**self).enumerate(types, pattern)
    }

    fn relatives(
        &self,
        ids: &[ObjectId],
        kind: RelativeKind,
        full_path: bool,
    ) -> ProviderResult<Vec<ObjectId>> {
        (**self).relatives(ids, kind, full_path)
    }

    fn history(&self, ids: &[ObjectId]) -> ProviderResult<Vec<ObjectId>> {
        (**self).history(ids)
    }

    fn future(&self, ids: &[ObjectId]) -> ProviderResult<Vec<ObjectId>> {
        (**self).future(ids)
    }

    fn get_attribute(&self, id: &ObjectId, attribute: &str) -> ProviderResult<Value> {
        (**self).get_attribute(id, attribute)
    }

    fn world_positions(&self, ids: &[ObjectId]) -> ProviderResult<Vec<Vec3>> {
        (**self).world_positions(ids)
    }
}
