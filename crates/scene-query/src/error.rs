//! Error types for providers and query evaluation.

use thiserror::Error;

use crate::id::ObjectId;

/// Errors reported by a [`SceneProvider`](crate::SceneProvider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The object lacks the attribute, or it cannot be read.
    #[error("attribute not found: {object}.{attribute}")]
    AttributeNotFound { object: ObjectId, attribute: String },

    /// The host cannot be reached or the host call failed.
    #[error("scene provider unavailable: {0}")]
    Unavailable(String),

    /// The provider does not implement this capability.
    #[error("unsupported provider operation: {0}")]
    Unsupported(&'static str),
}

/// Errors raised while building or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The host failed for reasons unrelated to the query's content.
    #[error("scene provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A strict attribute predicate (or a projection) hit a missing attribute.
    #[error("attribute not found: {object}.{attribute}")]
    AttributeNotFound { object: ObjectId, attribute: String },

    /// Chaining or combinator call with structurally invalid parameters.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// The provider lacks a capability the expression needs.
    #[error("unsupported provider operation: {0}")]
    Unsupported(&'static str),

    /// An operator that needs scene objects received a plain value.
    #[error("expected a scene object, got value `{item}`")]
    NotAnObject { item: String },

    /// `to_map` received an item that is not an (identifier, value) pair.
    #[error("expected an (object, value) pair, got `{item}`")]
    NotAPair { item: String },

    /// Fixed-size coercion of a sequence with the wrong length.
    #[error("expected {expected} items, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

impl From<ProviderError> for QueryError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AttributeNotFound { object, attribute } => {
                Self::AttributeNotFound { object, attribute }
            }
            ProviderError::Unavailable(reason) => Self::ProviderUnavailable(reason),
            ProviderError::Unsupported(op) => Self::Unsupported(op),
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type for query construction and evaluation.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err: QueryError = ProviderError::AttributeNotFound {
            object: "|cube".into(),
            attribute: "ty".into(),
        }
        .into();
        assert_eq!(
            err,
            QueryError::AttributeNotFound {
                object: "|cube".into(),
                attribute: "ty".into()
            }
        );
        assert_eq!(err.to_string(), "attribute not found: |cube.ty");

        let err: QueryError = ProviderError::Unavailable("host gone".into()).into();
        assert!(matches!(err, QueryError::ProviderUnavailable(ref r) if r == "host gone"));
    }
}
