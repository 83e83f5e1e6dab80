//! Predicates for `where_` / `where_not` filters.
//!
//! A [`Predicate`] is either an arbitrary closure over an [`Item`] or an
//! [`AttrPredicate`] built with [`attr`]. Attribute predicates compare against
//! live attribute values, so they are only resolved during evaluation:
//!
//! ```
//! use scene_query::{attr, scene, transforms};
//!
//! let raised = transforms().where_(attr("ty").gt(0.0));
//! let strict = scene().where_(attr("visibility").strict().eq(true));
//! # let _ = (raised, strict);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{ProviderError, QueryError, QueryResult};
use crate::item::Item;
use crate::provider::SceneProvider;
use crate::value::Value;

type ItemFn = dyn Fn(&Item) -> bool + Send + Sync;

/// A test applied to each item by a predicate filter.
#[derive(Clone)]
pub struct Predicate {
    kind: PredicateKind,
}

#[derive(Clone)]
enum PredicateKind {
    Fn(Arc<ItemFn>),
    Attr(AttrPredicate),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Item) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: PredicateKind::Fn(Arc::new(f)),
        }
    }

    /// Wrap a closure returning any value; the item passes when the value is
    /// truthy (see [`Value::is_truthy`]).
    pub fn truthy<F, V>(f: F) -> Self
    where
        F: Fn(&Item) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Self::new(move |item| f(item).into().is_truthy())
    }

    /// Both predicates hold. `other` is skipped when `self` fails.
    #[must_use]
    pub fn and(self, other: impl Into<Predicate>) -> Self {
        Self {
            kind: PredicateKind::And(Box::new(self), Box::new(other.into())),
        }
    }

    /// Either predicate holds. `other` is skipped when `self` passes.
    #[must_use]
    pub fn or(self, other: impl Into<Predicate>) -> Self {
        Self {
            kind: PredicateKind::Or(Box::new(self), Box::new(other.into())),
        }
    }

    /// Evaluate against one item.
    pub(crate) fn test(&self, item: &Item, scene: &dyn SceneProvider) -> QueryResult<bool> {
        match &self.kind {
            PredicateKind::Fn(f) => Ok(f(item)),
            PredicateKind::Attr(p) => p.test(item, scene),
            PredicateKind::Not(inner) => Ok(!inner.test(item, scene)?),
            PredicateKind::And(a, b) => Ok(a.test(item, scene)? && b.test(item, scene)?),
            PredicateKind::Or(a, b) => Ok(a.test(item, scene)? || b.test(item, scene)?),
        }
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Self::Output {
        Self {
            kind: PredicateKind::Not(Box::new(self)),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PredicateKind::Fn(_) => f.write_str("<fn>"),
            PredicateKind::Attr(p) => write!(f, "{p}"),
            PredicateKind::Not(inner) => write!(f, "!({inner})"),
            PredicateKind::And(a, b) => write!(f, "({a} && {b})"),
            PredicateKind::Or(a, b) => write!(f, "({a} || {b})"),
        }
    }
}

impl From<AttrPredicate> for Predicate {
    fn from(p: AttrPredicate) -> Self {
        Self {
            kind: PredicateKind::Attr(p),
        }
    }
}

// ============================================================================
// Attribute predicates
// ============================================================================

/// Comparison applied by an [`AttrPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// The attribute can be read; the operand is ignored.
    Exists,
}

impl Comparison {
    /// Apply to an attribute value and an operand.
    ///
    /// Incomparable kinds are neither equal nor ordered, so only `Ne` holds.
    #[must_use]
    pub fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};

        let ord = lhs.compare(rhs);
        match self {
            Self::Eq => ord == Some(Equal),
            Self::Ne => ord != Some(Equal),
            Self::Lt => ord == Some(Less),
            Self::Le => matches!(ord, Some(Less | Equal)),
            Self::Gt => ord == Some(Greater),
            Self::Ge => matches!(ord, Some(Greater | Equal)),
            Self::Exists => true,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Exists => "exists",
        }
    }
}

/// Start building an attribute predicate.
pub fn attr(name: impl Into<String>) -> Attr {
    Attr {
        name: name.into(),
        strict: false,
    }
}

/// Attribute accessor; comparison methods produce [`AttrPredicate`]s instead
/// of comparing immediately.
#[derive(Debug, Clone)]
pub struct Attr {
    name: String,
    strict: bool,
}

impl Attr {
    /// Raise [`QueryError::AttributeNotFound`] instead of excluding items that
    /// lack the attribute.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn compare(self, comparison: Comparison, operand: Value) -> AttrPredicate {
        AttrPredicate {
            attribute: self.name,
            comparison,
            operand,
            strict: self.strict,
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> AttrPredicate {
        self.compare(Comparison::Eq, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> AttrPredicate {
        self.compare(Comparison::Ne, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> AttrPredicate {
        self.compare(Comparison::Lt, value.into())
    }

    pub fn le(self, value: impl Into<Value>) -> AttrPredicate {
        self.compare(Comparison::Le, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> AttrPredicate {
        self.compare(Comparison::Gt, value.into())
    }

    pub fn ge(self, value: impl Into<Value>) -> AttrPredicate {
        self.compare(Comparison::Ge, value.into())
    }

    /// Holds when the attribute can be read. Never raises for a missing
    /// attribute, strict or not.
    pub fn exists(self) -> AttrPredicate {
        self.compare(Comparison::Exists, Value::Bool(true))
    }
}

/// A deferred attribute comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrPredicate {
    attribute: String,
    comparison: Comparison,
    operand: Value,
    strict: bool,
}

impl AttrPredicate {
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    #[must_use]
    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    #[must_use]
    pub fn operand(&self) -> &Value {
        &self.operand
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Same comparison with the given strictness.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Read the attribute off `item` and compare.
    ///
    /// A missing attribute (or an item that is not a scene object) is `false`
    /// unless strict. Provider outages always propagate.
    pub fn test(&self, item: &Item, scene: &dyn SceneProvider) -> QueryResult<bool> {
        let Some(id) = item.object_id() else {
            if self.strict && self.comparison != Comparison::Exists {
                return Err(QueryError::NotAnObject {
                    item: item.to_string(),
                });
            }
            return Ok(false);
        };

        match scene.get_attribute(id, &self.attribute) {
            Ok(value) => Ok(self.comparison.apply(&value, &self.operand)),
            Err(ProviderError::AttributeNotFound { object, attribute }) => {
                if self.strict && self.comparison != Comparison::Exists {
                    return Err(QueryError::AttributeNotFound { object, attribute });
                }
                tracing::trace!("{object} has no readable `{attribute}`, excluding");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl fmt::Display for AttrPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparison == Comparison::Exists {
            write!(f, "exists({})", self.attribute)?;
        } else {
            write!(
                f,
                "{} {} {}",
                self.attribute,
                self.comparison.symbol(),
                self.operand
            )?;
        }
        if self.strict {
            f.write_str(" [strict]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;

    fn fixture() -> MemoryScene {
        let mut scene = MemoryScene::new();
        let a = scene.spawn("transform", "high", None);
        let b = scene.spawn("transform", "low", None);
        scene.spawn("transform", "bare", None);
        scene.set_attribute(&a, "ty", 5.0);
        scene.set_attribute(&b, "ty", -1);
        scene
    }

    fn obj(path: &str) -> Item {
        Item::Object(path.into())
    }

    #[test]
    fn test_comparisons() {
        let scene = fixture();
        let gt = attr("ty").gt(0);
        assert!(gt.test(&obj("|high"), &scene).unwrap());
        assert!(!gt.test(&obj("|low"), &scene).unwrap());

        let le = attr("ty").le(-1.0);
        assert!(le.test(&obj("|low"), &scene).unwrap());
        assert!(!le.test(&obj("|high"), &scene).unwrap());

        assert!(attr("ty").ne(3).test(&obj("|high"), &scene).unwrap());
        assert!(attr("ty").eq(5).test(&obj("|high"), &scene).unwrap());
    }

    #[test]
    fn test_missing_attribute_non_strict_is_false() {
        let scene = fixture();
        assert!(!attr("ty").gt(0).test(&obj("|bare"), &scene).unwrap());
        assert!(!attr("ty").ne(0).test(&obj("|bare"), &scene).unwrap());
    }

    #[test]
    fn test_missing_attribute_strict_errors() {
        let scene = fixture();
        let err = attr("ty").strict().gt(0).test(&obj("|bare"), &scene).unwrap_err();
        assert_eq!(
            err,
            QueryError::AttributeNotFound {
                object: "|bare".into(),
                attribute: "ty".into()
            }
        );
    }

    #[test]
    fn test_with_strict_overrides_builder_flag() {
        let scene = fixture();
        let lenient = attr("ty").strict().gt(0).with_strict(false);
        assert!(!lenient.is_strict());
        assert!(!lenient.test(&obj("|bare"), &scene).unwrap());

        let strict = attr("ty").gt(0).with_strict(true);
        assert!(strict.test(&obj("|bare"), &scene).is_err());
        assert!(strict.test(&obj("|high"), &scene).unwrap());
    }

    #[test]
    fn test_truthy_converts_closure_results() {
        let scene = fixture();
        let named_high = Predicate::truthy(|item: &Item| item.leaf_name() == "high");
        assert!(named_high.test(&obj("|high"), &scene).unwrap());
        assert!(!named_high.test(&obj("|low"), &scene).unwrap());

        let text = Predicate::truthy(|item: &Item| item.leaf_name().replace("bare", ""));
        assert!(!text.test(&obj("|bare"), &scene).unwrap());
        assert!(text.test(&obj("|low"), &scene).unwrap());
    }

    #[test]
    fn test_exists_never_raises() {
        let scene = fixture();
        let exists = attr("ty").strict().exists();
        assert!(exists.test(&obj("|high"), &scene).unwrap());
        assert!(!exists.test(&obj("|bare"), &scene).unwrap());
    }

    #[test]
    fn test_unavailable_provider_propagates_even_when_lenient() {
        let mut scene = fixture();
        scene.set_unavailable(true);
        let err = attr("ty").gt(0).test(&obj("|high"), &scene).unwrap_err();
        assert!(matches!(err, QueryError::ProviderUnavailable(_)));
    }

    #[test]
    fn test_combinators_short_circuit() {
        let scene = fixture();
        let boom = Predicate::new(|_| panic!("should not run"));
        let never = Predicate::new(|_| false);
        assert!(!never.clone().and(boom.clone()).test(&obj("|high"), &scene).unwrap());

        let always = !never;
        assert!(always.or(boom).test(&obj("|high"), &scene).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(attr("ty").gt(0).to_string(), "ty > 0");
        assert_eq!(attr("v").strict().eq(true).to_string(), "v == true [strict]");
        let p = Predicate::from(attr("a").exists()).and(Predicate::new(|_| true));
        assert_eq!(p.to_string(), "(exists(a) && <fn>)");
    }
}
