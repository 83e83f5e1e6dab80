#![allow(clippy::missing_panics_doc)]
#![allow(clippy::should_implement_trait)]

//! Scene Query - lazy, composable queries over a host scene graph
//!
//! Expressions are built by chaining and evaluated only when coerced. Each
//! evaluation runs against a [`SceneProvider`] and reflects the scene as it
//! is at that moment.
//!
//! # Key Concepts
//!
//! - **Expr**: An immutable, shareable description of a deferred query
//! - **Plan**: The optimized form of an expression; consecutive type filters
//!   collapse into a single provider call
//! - **Item**: What an evaluation yields: an object, a value, or an
//!   `(object, value)` pair
//! - **SceneProvider**: The host adapter; every host access is a batched call
//!
//! # Example
//!
//! ```
//! use scene_query::prelude::*;
//! use scene_query::memory::MemoryScene;
//!
//! let mut world = MemoryScene::new();
//! let wall = world.spawn("transform", "wall", None);
//! world.spawn("mesh", "wallShape", Some(&wall));
//! world.spawn("pointLight", "key", None);
//! world.set_attribute(&wall, "ty", 2.0);
//!
//! let raised = transforms().where_(attr("ty").gt(0.0));
//! assert_eq!(raised.to_vec(&world)?, ["|wall"]);
//!
//! let lit = scene().of_type(["mesh"])?.of_type(["light"])?;
//! assert_eq!(lit.count(&world)?, 2);
//!
//! let shapes = raised.shapes().short_names();
//! assert_eq!(shapes.first(&world)?, Some(Item::from(Value::from("wallShape"))));
//! # Ok::<(), QueryError>(())
//! ```

mod config;
mod error;
mod eval;
mod expr;
mod id;
mod item;
mod optimize;
mod predicate;
mod provider;
mod value;

#[cfg(feature = "test-utils")]
pub mod memory;

pub use config::EvalConfig;
pub use error::{ProviderError, ProviderResult, QueryError, QueryResult};
pub use eval::{BoundIter, BoundQuery, Evaluator, TRANSLATE_ATTRIBUTE};
pub use expr::{
    Expr, NameFilter, OpKind, Projection, RegexFlags, Relation, SetOp, Slice, Source, cameras,
    lights, meshes, named, nodes_of_type, scene, transforms,
};
pub use id::{ObjectId, PATH_SEPARATOR, TypeSet};
pub use item::{Item, ItemKey};
pub use optimize::{Plan, optimize};
pub use predicate::{Attr, AttrPredicate, Comparison, Predicate, attr};
pub use provider::{RelativeKind, SceneProvider, WORLD_POSITION_ATTRIBUTE};
pub use value::{Value, Vec3};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Expr, Item, ObjectId, Predicate, QueryError, QueryResult, RegexFlags, SceneProvider,
        Value, attr, cameras, lights, meshes, named, nodes_of_type, scene, transforms,
    };
}
