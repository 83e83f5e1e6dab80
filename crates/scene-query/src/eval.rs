//! Evaluation: optimize, then execute a plan against a [`SceneProvider`].
//!
//! Every entry point runs the full pipeline from scratch. Nothing is cached
//! between calls, so re-evaluating a stored expression observes the scene as
//! it is now.

use std::vec;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::config::EvalConfig;
use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, Projection, Relation, SetOp, Slice};
use crate::id::{ObjectId, TypeSet};
use crate::item::{Item, ItemKey};
use crate::optimize::{Plan, optimize};
use crate::provider::SceneProvider;
use crate::value::Value;

/// Attribute read by [`Expr::translations`].
pub const TRANSLATE_ATTRIBUTE: &str = "translate";

/// Runs expressions against one provider.
#[derive(Clone, Copy)]
pub struct Evaluator<'s> {
    scene: &'s dyn SceneProvider,
    config: EvalConfig,
}

impl<'s> Evaluator<'s> {
    /// Evaluator with default settings.
    pub fn new(scene: &'s dyn SceneProvider) -> Self {
        Self::with_config(scene, EvalConfig::default())
    }

    pub fn with_config(scene: &'s dyn SceneProvider, config: EvalConfig) -> Self {
        Self { scene, config }
    }

    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Optimize and execute `expr`.
    pub fn evaluate(&self, expr: &Expr) -> QueryResult<Vec<Item>> {
        let plan = optimize(expr, &self.config);
        debug!(
            "evaluating {expr} as {plan} ({} batched calls)",
            plan.batched_calls()
        );
        let items = self.execute(&plan)?;
        debug!("{expr} produced {} items", items.len());
        Ok(items)
    }

    /// Evaluate afresh and iterate the result.
    pub fn iter(&self, expr: &Expr) -> QueryResult<vec::IntoIter<Item>> {
        Ok(self.evaluate(expr)?.into_iter())
    }

    fn execute(&self, plan: &Plan<'_>) -> QueryResult<Vec<Item>> {
        match plan {
            Plan::Enumerate { types, pattern } => self.enumerate(types, *pattern),
            Plan::TypeFilter { input, calls } => {
                let items = self.execute(input)?;
                self.filter_types(items, calls)
            }
            Plan::NameFilter { input, filter } => {
                let mut items = self.execute(input)?;
                items.retain(|item| filter.keeps(item));
                Ok(items)
            }
            Plan::Where {
                input,
                predicate,
                keep,
            } => {
                let items = self.execute(input)?;
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if predicate.test(&item, self.scene)? == *keep {
                        kept.push(item);
                    }
                }
                Ok(kept)
            }
            Plan::Relation { input, relation } => {
                let items = self.execute(input)?;
                self.relate(&items, *relation)
            }
            Plan::Project { input, projection } => {
                let items = self.execute(input)?;
                self.project(items, projection)
            }
            Plan::Slice { input, slice } => {
                let items = self.execute(input)?;
                Ok(apply_slice(items, *slice))
            }
            Plan::Combine { left, right, op } => {
                let left = self.execute(left)?;
                let right = self.execute(right)?;
                Ok(combine(*op, left, right))
            }
        }
    }

    fn enumerate(&self, types: &TypeSet, pattern: Option<&str>) -> QueryResult<Vec<Item>> {
        trace!("enumerate types=[{types}] pattern={pattern:?}");
        let ids = self.scene.enumerate(types, pattern)?;
        Ok(ids.into_iter().map(Item::Object).collect())
    }

    fn filter_types(&self, items: Vec<Item>, calls: &[TypeSet]) -> QueryResult<Vec<Item>> {
        if items.is_empty() {
            return Ok(items);
        }
        // Short identifiers from relations match on leaf name; full paths
        // only match full paths.
        let short_names = !self.config.full_paths;
        let mut full: HashSet<ObjectId> = HashSet::new();
        let mut leaves: HashSet<String> = HashSet::new();
        for types in calls {
            trace!("enumerate types=[{types}] for type filter over {} items", items.len());
            for id in self.scene.enumerate(types, None)? {
                if short_names {
                    leaves.insert(id.leaf_name().to_owned());
                }
                full.insert(id);
            }
        }

        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let id = object_id(&item)?;
            let matches = if id.is_full_path() {
                full.contains(id)
            } else {
                full.contains(id) || leaves.contains(id.as_str())
            };
            if matches {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    fn relate(&self, items: &[Item], relation: Relation) -> QueryResult<Vec<Item>> {
        let ids = object_ids(items)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        trace!("{relation} of {} objects", ids.len());

        let related = match relation {
            Relation::Relatives(kind) => self.scene.relatives(&ids, kind, self.config.full_paths)?,
            Relation::History => self.scene.history(&ids)?,
            Relation::Future => self.scene.future(&ids)?,
        };
        Ok(dedup(related.into_iter().map(Item::Object)))
    }

    fn project(&self, items: Vec<Item>, projection: &Projection) -> QueryResult<Vec<Item>> {
        match projection {
            Projection::Cast(f) => Ok(items.iter().map(|item| f(item)).collect()),
            Projection::ShortNames => Ok(items
                .iter()
                .map(|item| Item::Value(Value::Text(item.leaf_name().into_owned())))
                .collect()),
            Projection::Translations => self.read_attribute(items, TRANSLATE_ATTRIBUTE),
            Projection::Attribute(name) => self.read_attribute(items, name),
            Projection::WorldPositions => {
                let ids = object_ids(&items)?;
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                trace!("world positions of {} objects", ids.len());
                let positions = self.scene.world_positions(&ids)?;
                if positions.len() != ids.len() {
                    return Err(QueryError::ProviderUnavailable(format!(
                        "world_positions returned {} values for {} objects",
                        positions.len(),
                        ids.len()
                    )));
                }
                Ok(ids
                    .into_iter()
                    .zip(positions)
                    .map(|(id, pos)| Item::Pair(id, Value::Vector(pos)))
                    .collect())
            }
        }
    }

    fn read_attribute(&self, items: Vec<Item>, attribute: &str) -> QueryResult<Vec<Item>> {
        items
            .into_iter()
            .map(|item| {
                let id = object_id(&item)?.clone();
                let value = self.scene.get_attribute(&id, attribute)?;
                Ok(Item::Pair(id, value))
            })
            .collect()
    }
}

fn object_id(item: &Item) -> QueryResult<&ObjectId> {
    item.object_id().ok_or_else(|| QueryError::NotAnObject {
        item: item.to_string(),
    })
}

fn object_ids(items: &[Item]) -> QueryResult<Vec<ObjectId>> {
    items
        .iter()
        .map(|item| object_id(item).cloned())
        .collect()
}

/// Keep first occurrences by [`Item::key`].
fn dedup(items: impl IntoIterator<Item = Item>) -> Vec<Item> {
    let mut seen: HashSet<ItemKey> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.key()))
        .collect()
}

fn apply_slice(mut items: Vec<Item>, slice: Slice) -> Vec<Item> {
    match slice {
        Slice::Take(n) => {
            items.truncate(n);
            items
        }
        Slice::Distinct => dedup(items),
        Slice::Sorted => {
            items.sort_by_key(Item::key);
            items
        }
    }
}

/// Combine two evaluated sequences, keyed by identifier.
pub(crate) fn combine(op: SetOp, left: Vec<Item>, right: Vec<Item>) -> Vec<Item> {
    let keys = |items: &[Item]| -> HashSet<ItemKey> { items.iter().map(Item::key).collect() };

    match op {
        SetOp::Union => dedup(left.into_iter().chain(right)),
        SetOp::Intersect => {
            let right_keys = keys(&right);
            dedup(left.into_iter().filter(|i| right_keys.contains(&i.key())))
        }
        SetOp::Difference => {
            let right_keys = keys(&right);
            dedup(left.into_iter().filter(|i| !right_keys.contains(&i.key())))
        }
        SetOp::SymmetricDifference => {
            let left_keys = keys(&left);
            let right_keys = keys(&right);
            let only_left = left
                .into_iter()
                .filter(|i| !right_keys.contains(&i.key()));
            let only_right = right
                .into_iter()
                .filter(|i| !left_keys.contains(&i.key()));
            dedup(only_left.chain(only_right))
        }
    }
}

// ============================================================================
// Entry points on expressions
// ============================================================================

impl Expr {
    /// Evaluate against `scene` with default settings.
    pub fn evaluate(&self, scene: &dyn SceneProvider) -> QueryResult<Vec<Item>> {
        Evaluator::new(scene).evaluate(self)
    }

    /// Coerce to an ordered sequence; same as [`evaluate`](Self::evaluate).
    pub fn to_vec(&self, scene: &dyn SceneProvider) -> QueryResult<Vec<Item>> {
        self.evaluate(scene)
    }

    /// Coerce to exactly `N` items.
    pub fn to_array<const N: usize>(&self, scene: &dyn SceneProvider) -> QueryResult<[Item; N]> {
        let items = self.evaluate(scene)?;
        let actual = items.len();
        items.try_into().map_err(|_| QueryError::LengthMismatch {
            expected: N,
            actual,
        })
    }

    /// First item, if any.
    pub fn first(&self, scene: &dyn SceneProvider) -> QueryResult<Option<Item>> {
        Ok(self.evaluate(scene)?.into_iter().next())
    }

    /// Number of items.
    pub fn count(&self, scene: &dyn SceneProvider) -> QueryResult<usize> {
        Ok(self.evaluate(scene)?.len())
    }

    /// Collect `(id, value)` pairs into a map.
    ///
    /// Fails with [`QueryError::NotAPair`] if any item is not a pair, so use
    /// it after a named projection such as [`translations`](Self::translations).
    pub fn to_map(&self, scene: &dyn SceneProvider) -> QueryResult<HashMap<ObjectId, Value>> {
        self.evaluate(scene)?
            .into_iter()
            .map(|item| match item {
                Item::Pair(id, value) => Ok((id, value)),
                other => Err(QueryError::NotAPair {
                    item: other.to_string(),
                }),
            })
            .collect()
    }

    /// Attach a provider so the expression can be iterated directly.
    pub fn bind<'s>(&self, scene: &'s dyn SceneProvider) -> BoundQuery<'s> {
        BoundQuery {
            expr: self.clone(),
            evaluator: Evaluator::new(scene),
        }
    }
}

/// An expression paired with an evaluator.
///
/// Iterating `&BoundQuery` evaluates afresh each time:
///
/// ```
/// # use scene_query::{scene, memory::MemoryScene};
/// let mut world = MemoryScene::new();
/// world.spawn("transform", "root", None);
/// let query = scene();
/// let bound = query.bind(&world);
/// for item in &bound {
///     assert!(item?.object_id().is_some());
/// }
/// # Ok::<(), scene_query::QueryError>(())
/// ```
pub struct BoundQuery<'s> {
    expr: Expr,
    evaluator: Evaluator<'s>,
}

impl<'s> BoundQuery<'s> {
    /// Replace the evaluation settings.
    #[must_use]
    pub fn with_config(self, config: EvalConfig) -> Self {
        Self {
            evaluator: Evaluator::with_config(self.evaluator.scene, config),
            ..self
        }
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self) -> QueryResult<Vec<Item>> {
        self.evaluator.evaluate(&self.expr)
    }

    pub fn iter(&self) -> QueryResult<vec::IntoIter<Item>> {
        self.evaluator.iter(&self.expr)
    }
}

impl<'s> IntoIterator for &BoundQuery<'s> {
    type Item = QueryResult<Item>;
    type IntoIter = BoundIter;

    fn into_iter(self) -> Self::IntoIter {
        match self.iter() {
            Ok(items) => BoundIter::Items(items),
            Err(err) => BoundIter::Failed(Some(err)),
        }
    }
}

/// Iterator over a fresh evaluation; yields the evaluation error once if it failed.
pub enum BoundIter {
    Items(vec::IntoIter<Item>),
    Failed(Option<QueryError>),
}

impl Iterator for BoundIter {
    type Item = QueryResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Items(items) => items.next().map(Ok),
            Self::Failed(err) => err.take().map(Err),
        }
    }
}
