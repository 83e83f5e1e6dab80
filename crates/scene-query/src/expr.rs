//! Expression nodes and the chaining protocol.
//!
//! An [`Expr`] is a handle to an immutable node describing one deferred
//! operation plus the node(s) it reads from. Chaining never mutates a node;
//! every call allocates a new node that points at the receiver, so an
//! expression can be stored, branched and evaluated any number of times:
//!
//! ```
//! use scene_query::{cameras, RegexFlags};
//!
//! let cams = cameras();
//! let persp = cams.like("persp")?;
//! let ortho = cams.unlike_with("PERSP", RegexFlags::IGNORE_CASE)?;
//! assert_eq!(cams.to_string(), "nodes_of_type(camera)");
//! assert_eq!(persp.to_string(), "nodes_of_type(camera).like(\"persp\")");
//! # let _ = ortho;
//! # Ok::<(), scene_query::QueryError>(())
//! ```
//!
//! # Operator families
//!
//! - Sources: [`scene`], [`named`], [`nodes_of_type`] and the typed shorthands
//! - Type filter: [`Expr::of_type`]
//! - Name filters: [`Expr::like`], [`Expr::unlike`]
//! - Predicate filters: [`Expr::where_`], [`Expr::where_not`]
//! - Relations: [`Expr::parents`], [`Expr::children`], [`Expr::shapes`], ...
//! - Projections: [`Expr::cast`], [`Expr::translations`], ...
//! - Slices: [`Expr::take`], [`Expr::distinct`], [`Expr::sorted`]
//! - Set algebra: [`Expr::union`] (`|`), [`Expr::intersect`] (`&`),
//!   [`Expr::difference`] (`-`), [`Expr::symmetric_difference`] (`^`)

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use regex::{Regex, RegexBuilder};
use smallvec::{SmallVec, smallvec};

use crate::error::{QueryError, QueryResult};
use crate::id::TypeSet;
use crate::item::Item;
use crate::predicate::Predicate;
use crate::provider::RelativeKind;

// ============================================================================
// Operator parameters
// ============================================================================

/// Root enumeration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Types to enumerate; empty means any type.
    pub types: TypeSet,
    /// Glob-style name pattern handed to the provider.
    pub pattern: Option<String>,
}

bitflags! {
    /// Flags passed through to the regex engine by name filters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegexFlags: u8 {
        const IGNORE_CASE = 1;
        const MULTI_LINE = 1 << 1;
        const DOT_ALL = 1 << 2;
        const VERBOSE = 1 << 3;
    }
}

/// Regex test against each item's leaf name.
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Regex,
    flags: RegexFlags,
    keep_matches: bool,
}

impl NameFilter {
    fn new(pattern: &str, flags: RegexFlags, keep_matches: bool) -> QueryResult<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains(RegexFlags::IGNORE_CASE))
            .multi_line(flags.contains(RegexFlags::MULTI_LINE))
            .dot_matches_new_line(flags.contains(RegexFlags::DOT_ALL))
            .ignore_whitespace(flags.contains(RegexFlags::VERBOSE))
            .build()
            .map_err(|e| QueryError::InvalidExpression(format!("bad name pattern: {e}")))?;
        Ok(Self {
            regex,
            flags,
            keep_matches,
        })
    }

    /// Whether the item survives this filter.
    #[must_use]
    pub fn keeps(&self, item: &Item) -> bool {
        self.regex.is_match(&item.leaf_name()) == self.keep_matches
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    #[must_use]
    pub fn flags(&self) -> RegexFlags {
        self.flags
    }
}

/// A host-provided relation, resolved with one batched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `SceneProvider::relatives` of the given kind.
    Relatives(RelativeKind),
    /// Upstream dependency history.
    History,
    /// Downstream dependents.
    Future,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relatives(kind) => write!(f, "{kind}"),
            Self::History => f.write_str("history"),
            Self::Future => f.write_str("future"),
        }
    }
}

type CastFn = dyn Fn(&Item) -> Item + Send + Sync;

/// Per-item transform. Never changes the sequence length.
#[derive(Clone)]
pub enum Projection {
    /// Arbitrary function of the item.
    Cast(Arc<CastFn>),
    /// `(id, translate)` pairs.
    Translations,
    /// `(id, world position)` pairs from one batched provider call.
    WorldPositions,
    /// `(id, value)` pairs for a named attribute.
    Attribute(String),
    /// Leaf names as text values.
    ShortNames,
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cast(_) => f.write_str("Cast(<fn>)"),
            Self::Translations => f.write_str("Translations"),
            Self::WorldPositions => f.write_str("WorldPositions"),
            Self::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            Self::ShortNames => f.write_str("ShortNames"),
        }
    }
}

/// Order/length operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    Take(usize),
    Distinct,
    Sorted,
}

/// Set algebra over two evaluated sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    Union,
    Intersect,
    Difference,
    SymmetricDifference,
}

impl SetOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Union => "|",
            Self::Intersect => "&",
            Self::Difference => "-",
            Self::SymmetricDifference => "^",
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Operator family of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Source,
    TypeFilter,
    NameFilter,
    Where,
    Relation,
    Projection,
    Slice,
    Combine,
}

#[derive(Debug)]
pub(crate) enum Node {
    Source(Source),
    TypeFilter {
        input: Expr,
        types: TypeSet,
    },
    NameFilter {
        input: Expr,
        filter: NameFilter,
    },
    Where {
        input: Expr,
        predicate: Predicate,
        keep: bool,
    },
    Relation {
        input: Expr,
        relation: Relation,
    },
    Project {
        input: Expr,
        projection: Projection,
    },
    Slice {
        input: Expr,
        slice: Slice,
    },
    Combine {
        left: Expr,
        right: Expr,
        op: SetOp,
    },
}

/// Handle to an immutable expression node.
///
/// Cloning shares the node. Every chaining method returns a new handle and
/// leaves `self` untouched.
#[derive(Clone)]
pub struct Expr(Arc<Node>);

impl Expr {
    fn wrap(node: Node) -> Self {
        Self(Arc::new(node))
    }

    pub(crate) fn node(&self) -> &Node {
        &self.0
    }

    /// Operator family of this node.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self.node() {
            Node::Source(_) => OpKind::Source,
            Node::TypeFilter { .. } => OpKind::TypeFilter,
            Node::NameFilter { .. } => OpKind::NameFilter,
            Node::Where { .. } => OpKind::Where,
            Node::Relation { .. } => OpKind::Relation,
            Node::Project { .. } => OpKind::Projection,
            Node::Slice { .. } => OpKind::Slice,
            Node::Combine { .. } => OpKind::Combine,
        }
    }

    /// The nodes this node reads from: none for sources, two for set
    /// combinators, one otherwise.
    #[must_use]
    pub fn inputs(&self) -> SmallVec<[&Expr; 2]> {
        match self.node() {
            Node::Source(_) => SmallVec::new(),
            Node::TypeFilter { input, .. }
            | Node::NameFilter { input, .. }
            | Node::Where { input, .. }
            | Node::Relation { input, .. }
            | Node::Project { input, .. }
            | Node::Slice { input, .. } => smallvec![input],
            Node::Combine { left, right, .. } => smallvec![left, right],
        }
    }

    /// Whether both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    /// Keep objects whose type is one of `types`.
    ///
    /// Consecutive `of_type` calls narrow by the union of their types and
    /// are fused into a single provider call at evaluation.
    pub fn of_type<I, S>(&self, types: I) -> QueryResult<Expr>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types = TypeSet::from_names(types);
        if types.is_empty() {
            return Err(QueryError::InvalidExpression(
                "of_type needs at least one type name".into(),
            ));
        }
        Ok(Self::wrap(Node::TypeFilter {
            input: self.clone(),
            types,
        }))
    }

    /// Keep items whose leaf name matches `pattern` (case-sensitive).
    pub fn like(&self, pattern: &str) -> QueryResult<Expr> {
        self.like_with(pattern, RegexFlags::empty())
    }

    /// [`like`](Self::like) with explicit regex flags.
    pub fn like_with(&self, pattern: &str, flags: RegexFlags) -> QueryResult<Expr> {
        self.name_filter(pattern, flags, true)
    }

    /// Keep items whose leaf name does not match `pattern` (case-sensitive).
    pub fn unlike(&self, pattern: &str) -> QueryResult<Expr> {
        self.unlike_with(pattern, RegexFlags::empty())
    }

    /// [`unlike`](Self::unlike) with explicit regex flags.
    pub fn unlike_with(&self, pattern: &str, flags: RegexFlags) -> QueryResult<Expr> {
        self.name_filter(pattern, flags, false)
    }

    fn name_filter(&self, pattern: &str, flags: RegexFlags, keep: bool) -> QueryResult<Expr> {
        Ok(Self::wrap(Node::NameFilter {
            input: self.clone(),
            filter: NameFilter::new(pattern, flags, keep)?,
        }))
    }

    /// Keep items for which `predicate` holds.
    #[must_use]
    pub fn where_(&self, predicate: impl Into<Predicate>) -> Expr {
        self.predicate_filter(predicate.into(), true)
    }

    /// Keep items for which `predicate` does not hold.
    #[must_use]
    pub fn where_not(&self, predicate: impl Into<Predicate>) -> Expr {
        self.predicate_filter(predicate.into(), false)
    }

    /// Shorthand for `where_(Predicate::new(f))`.
    #[must_use]
    pub fn where_fn<F>(&self, f: F) -> Expr
    where
        F: Fn(&Item) -> bool + Send + Sync + 'static,
    {
        self.predicate_filter(Predicate::new(f), true)
    }

    fn predicate_filter(&self, predicate: Predicate, keep: bool) -> Expr {
        Self::wrap(Node::Where {
            input: self.clone(),
            predicate,
            keep,
        })
    }

    // ------------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------------

    fn relation(&self, relation: Relation) -> Expr {
        Self::wrap(Node::Relation {
            input: self.clone(),
            relation,
        })
    }

    #[must_use]
    pub fn parents(&self) -> Expr {
        self.relation(Relation::Relatives(RelativeKind::Parent))
    }

    #[must_use]
    pub fn children(&self) -> Expr {
        self.relation(Relation::Relatives(RelativeKind::Child))
    }

    /// Children that are shapes.
    #[must_use]
    pub fn shapes(&self) -> Expr {
        self.relation(Relation::Relatives(RelativeKind::Shape))
    }

    /// Children without children of their own.
    #[must_use]
    pub fn leaves(&self) -> Expr {
        self.relation(Relation::Relatives(RelativeKind::Leaf))
    }

    /// All descendants.
    #[must_use]
    pub fn descendants(&self) -> Expr {
        self.relation(Relation::Relatives(RelativeKind::Descendant))
    }

    /// Upstream dependency history.
    #[must_use]
    pub fn history(&self) -> Expr {
        self.relation(Relation::History)
    }

    /// Downstream dependents.
    #[must_use]
    pub fn future(&self) -> Expr {
        self.relation(Relation::Future)
    }

    // ------------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------------

    fn project(&self, projection: Projection) -> Expr {
        Self::wrap(Node::Project {
            input: self.clone(),
            projection,
        })
    }

    /// Replace every item with `f(item)`.
    #[must_use]
    pub fn cast<F, T>(&self, f: F) -> Expr
    where
        F: Fn(&Item) -> T + Send + Sync + 'static,
        T: Into<Item>,
    {
        self.project(Projection::Cast(Arc::new(move |item: &Item| f(item).into())))
    }

    /// `(id, translate)` pairs.
    #[must_use]
    pub fn translations(&self) -> Expr {
        self.project(Projection::Translations)
    }

    /// `(id, world-space position)` pairs.
    #[must_use]
    pub fn world_positions(&self) -> Expr {
        self.project(Projection::WorldPositions)
    }

    /// `(id, value)` pairs of any attribute.
    #[must_use]
    pub fn attribute_values(&self, attribute: impl Into<String>) -> Expr {
        self.project(Projection::Attribute(attribute.into()))
    }

    /// Leaf names as text values.
    #[must_use]
    pub fn short_names(&self) -> Expr {
        self.project(Projection::ShortNames)
    }

    // ------------------------------------------------------------------------
    // Slices
    // ------------------------------------------------------------------------

    fn slice(&self, slice: Slice) -> Expr {
        Self::wrap(Node::Slice {
            input: self.clone(),
            slice,
        })
    }

    /// The first `n` items.
    #[must_use]
    pub fn take(&self, n: usize) -> Expr {
        self.slice(Slice::Take(n))
    }

    /// Drop repeated items, keeping first occurrences.
    #[must_use]
    pub fn distinct(&self) -> Expr {
        self.slice(Slice::Distinct)
    }

    /// Sort by identifier (or rendered value).
    #[must_use]
    pub fn sorted(&self) -> Expr {
        self.slice(Slice::Sorted)
    }

    // ------------------------------------------------------------------------
    // Set algebra
    // ------------------------------------------------------------------------

    fn combine(&self, other: &Expr, op: SetOp) -> Expr {
        Self::wrap(Node::Combine {
            left: self.clone(),
            right: other.clone(),
            op,
        })
    }

    /// Items of `self`, then items of `other` not already present.
    #[must_use]
    pub fn union(&self, other: &Expr) -> Expr {
        self.combine(other, SetOp::Union)
    }

    /// Items of `self` also present in `other`.
    #[must_use]
    pub fn intersect(&self, other: &Expr) -> Expr {
        self.combine(other, SetOp::Intersect)
    }

    /// Items of `self` absent from `other`. Not symmetric.
    #[must_use]
    pub fn difference(&self, other: &Expr) -> Expr {
        self.combine(other, SetOp::Difference)
    }

    /// `(self - other)` followed by `(other - self)`.
    #[must_use]
    pub fn symmetric_difference(&self, other: &Expr) -> Expr {
        self.combine(other, SetOp::SymmetricDifference)
    }
}

macro_rules! impl_set_op {
    ($trait:ident, $method:ident, $combinator:ident) => {
        impl std::ops::$trait for &Expr {
            type Output = Expr;

            fn $method(self, rhs: Self) -> Expr {
                self.$combinator(rhs)
            }
        }

        impl std::ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Self) -> Expr {
                self.$combinator(&rhs)
            }
        }
    };
}

impl_set_op!(BitOr, bitor, union);
impl_set_op!(BitAnd, bitand, intersect);
impl_set_op!(Sub, sub, difference);
impl_set_op!(BitXor, bitxor, symmetric_difference);

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Source(Source { types, pattern }) => match pattern {
                Some(p) => write!(f, "named({p:?})"),
                None if types.is_empty() => f.write_str("scene()"),
                None => write!(f, "nodes_of_type({types})"),
            },
            Node::TypeFilter { input, types } => write!(f, "{input}.of_type({types})"),
            Node::NameFilter { input, filter } => {
                let op = if filter.keep_matches { "like" } else { "unlike" };
                write!(f, "{input}.{op}({:?})", filter.pattern())
            }
            Node::Where {
                input,
                predicate,
                keep,
            } => {
                let op = if *keep { "where_" } else { "where_not" };
                write!(f, "{input}.{op}({predicate})")
            }
            Node::Relation { input, relation } => write!(f, "{input}.{relation}()"),
            Node::Project { input, projection } => match projection {
                Projection::Cast(_) => write!(f, "{input}.cast(<fn>)"),
                Projection::Translations => write!(f, "{input}.translations()"),
                Projection::WorldPositions => write!(f, "{input}.world_positions()"),
                Projection::Attribute(name) => write!(f, "{input}.attribute_values({name:?})"),
                Projection::ShortNames => write!(f, "{input}.short_names()"),
            },
            Node::Slice { input, slice } => match slice {
                Slice::Take(n) => write!(f, "{input}.take({n})"),
                Slice::Distinct => write!(f, "{input}.distinct()"),
                Slice::Sorted => write!(f, "{input}.sorted()"),
            },
            Node::Combine { left, right, op } => write!(f, "({left} {} {right})", op.symbol()),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self})")
    }
}

// ============================================================================
// Factories
// ============================================================================

fn source(types: TypeSet, pattern: Option<String>) -> Expr {
    Expr::wrap(Node::Source(Source { types, pattern }))
}

/// Every object in the scene.
#[must_use]
pub fn scene() -> Expr {
    source(TypeSet::any(), None)
}

/// Objects whose name matches a glob-style pattern (`pCube*`).
#[must_use]
pub fn named(pattern: impl Into<String>) -> Expr {
    source(TypeSet::any(), Some(pattern.into()))
}

/// Objects of any of the given types.
pub fn nodes_of_type<I, S>(types: I) -> QueryResult<Expr>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let types = TypeSet::from_names(types);
    if types.is_empty() {
        return Err(QueryError::InvalidExpression(
            "nodes_of_type needs at least one type name".into(),
        ));
    }
    Ok(source(types, None))
}

#[must_use]
pub fn cameras() -> Expr {
    source(TypeSet::from_names(["camera"]), None)
}

#[must_use]
pub fn lights() -> Expr {
    source(TypeSet::from_names(["light"]), None)
}

#[must_use]
pub fn meshes() -> Expr {
    source(TypeSet::from_names(["mesh"]), None)
}

#[must_use]
pub fn transforms() -> Expr {
    source(TypeSet::from_names(["transform"]), None)
}
