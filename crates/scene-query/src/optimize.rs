//! Fusion pass: turns an expression tree into an executable [`Plan`].
//!
//! Rewrites are purely about how many provider calls are issued, never about
//! which items come back:
//!
//! - `TypeFilter(a, TypeFilter(b, x))` → one type filter over `x` with `a ∪ b`
//! - a fused type run directly on an untyped source → one `enumerate` call
//!   carrying both the types and the source's name pattern
//!
//! Name filters, predicates, relations and projections are copied through
//! unchanged. New fusable pairs belong in [`optimize`] alongside the type run.

use std::fmt;

use smallvec::{SmallVec, smallvec};

use crate::config::EvalConfig;
use crate::expr::{Expr, NameFilter, Node, Projection, Relation, SetOp, Slice, Source};
use crate::id::TypeSet;
use crate::predicate::Predicate;

/// Executable form of an expression, borrowing parameters from its nodes.
#[derive(Debug)]
pub enum Plan<'e> {
    /// One `SceneProvider::enumerate` call.
    Enumerate {
        types: TypeSet,
        pattern: Option<&'e str>,
    },
    /// Keep upstream objects found by any of the `enumerate` calls, one call
    /// per type set. Fused plans carry a single set.
    TypeFilter {
        input: Box<Plan<'e>>,
        calls: SmallVec<[TypeSet; 1]>,
    },
    NameFilter {
        input: Box<Plan<'e>>,
        filter: &'e NameFilter,
    },
    Where {
        input: Box<Plan<'e>>,
        predicate: &'e Predicate,
        keep: bool,
    },
    Relation {
        input: Box<Plan<'e>>,
        relation: Relation,
    },
    Project {
        input: Box<Plan<'e>>,
        projection: &'e Projection,
    },
    Slice {
        input: Box<Plan<'e>>,
        slice: Slice,
    },
    Combine {
        left: Box<Plan<'e>>,
        right: Box<Plan<'e>>,
        op: SetOp,
    },
}

impl Plan<'_> {
    /// Batched provider calls this plan issues when every stage sees a
    /// non-empty input. Per-item attribute reads are not counted.
    #[must_use]
    pub fn batched_calls(&self) -> usize {
        match self {
            Self::Enumerate { .. } => 1,
            Self::TypeFilter { input, calls } => input.batched_calls() + calls.len(),
            Self::Relation { input, .. } => input.batched_calls() + 1,
            Self::Project { input, projection } => {
                let own = usize::from(matches!(projection, Projection::WorldPositions));
                input.batched_calls() + own
            }
            Self::NameFilter { input, .. } | Self::Where { input, .. } | Self::Slice { input, .. } => {
                input.batched_calls()
            }
            Self::Combine { left, right, .. } => left.batched_calls() + right.batched_calls(),
        }
    }
}

impl fmt::Display for Plan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enumerate { types, pattern } => {
                write!(f, "enumerate[{types}]")?;
                if let Some(p) = pattern {
                    write!(f, "({p:?})")?;
                }
                Ok(())
            }
            Self::TypeFilter { input, calls } => {
                write!(f, "{input} ∩ types")?;
                for types in calls {
                    write!(f, "[{types}]")?;
                }
                Ok(())
            }
            Self::NameFilter { input, filter } => write!(f, "{input} ~ /{}/", filter.pattern()),
            Self::Where {
                input,
                predicate,
                keep,
            } => {
                let neg = if *keep { "" } else { "!" };
                write!(f, "{input} ? {neg}{predicate}")
            }
            Self::Relation { input, relation } => write!(f, "{input} → {relation}"),
            Self::Project { input, projection } => write!(f, "{input} ↦ {projection:?}"),
            Self::Slice { input, slice } => write!(f, "{input} :: {slice:?}"),
            Self::Combine { left, right, op } => write!(f, "({left}) {op:?} ({right})"),
        }
    }
}

/// Build the plan for `expr`, fusing type-filter runs unless disabled.
pub fn optimize<'e>(expr: &'e Expr, config: &EvalConfig) -> Plan<'e> {
    let input = |e: &'e Expr| Box::new(optimize(e, config));

    match expr.node() {
        Node::Source(Source { types, pattern }) => Plan::Enumerate {
            types: types.clone(),
            pattern: pattern.as_deref(),
        },
        Node::TypeFilter { .. } => type_run(expr, config),
        Node::NameFilter { input: e, filter } => Plan::NameFilter {
            input: input(e),
            filter,
        },
        Node::Where {
            input: e,
            predicate,
            keep,
        } => Plan::Where {
            input: input(e),
            predicate,
            keep: *keep,
        },
        Node::Relation { input: e, relation } => Plan::Relation {
            input: input(e),
            relation: *relation,
        },
        Node::Project {
            input: e,
            projection,
        } => Plan::Project {
            input: input(e),
            projection,
        },
        Node::Slice { input: e, slice } => Plan::Slice {
            input: input(e),
            slice: *slice,
        },
        Node::Combine { left, right, op } => Plan::Combine {
            left: input(left),
            right: input(right),
            op: *op,
        },
    }
}

/// Plan a maximal run of consecutive type filters ending at `top`.
fn type_run<'e>(top: &'e Expr, config: &EvalConfig) -> Plan<'e> {
    let mut run: SmallVec<[&TypeSet; 4]> = SmallVec::new();
    let mut base = top;
    while let Node::TypeFilter { input, types } = base.node() {
        run.push(types);
        base = input;
    }
    // Walked top-down; restore chain order.
    run.reverse();

    let base = optimize(base, config);

    if !config.fusion {
        return Plan::TypeFilter {
            input: Box::new(base),
            calls: run.into_iter().cloned().collect(),
        };
    }

    let mut merged = TypeSet::any();
    for types in &run {
        merged.extend_from(types);
    }

    match base {
        Plan::Enumerate { types, pattern } if types.is_empty() => Plan::Enumerate {
            types: merged,
            pattern,
        },
        base => Plan::TypeFilter {
            input: Box::new(base),
            calls: smallvec![merged],
        },
    }
}
