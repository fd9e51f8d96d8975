//! Query construction and comparator errors

use std::fmt;

use thiserror::Error;

use super::comparator::Comparison;
use crate::schema::ValueError;

/// Result type for predicate evaluation
pub type ComparatorResult<T> = Result<T, ComparatorError>;

/// Raised while evaluating a comparator against a record or index key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparatorError {
    /// The comparator does not support this kind for its value type
    #[error("comparison {kind} not implemented for {type_name}")]
    NotImplemented {
        kind: Comparison,
        type_name: &'static str,
    },

    /// An operand could not be cast to the field type
    #[error("operand cast failed: {0}")]
    TypeMismatch(#[from] ValueError),

    /// A comparison kind that needs an operand was built with none
    #[error("comparison {0} requires an operand")]
    MissingOperand(Comparison),

    /// The Regexp operand is not a valid pattern
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A single builder mistake
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("or() must follow a condition or a closed bracket")]
    OrWithoutPrecedingCondition,

    #[error("not() cannot be applied to a bracket")]
    NotBeforeOpenBracket,

    #[error("close_bracket() without a matching open_bracket()")]
    UnbalancedCloseBracket,

    #[error("{0} bracket(s) left open")]
    UnclosedBrackets(usize),

    #[error("brackets must contain at least one condition")]
    EmptyBrackets,

    #[error("or() is not followed by a condition")]
    DanglingOr,

    #[error("not() is not followed by a condition")]
    DanglingNot,
}

/// Every mistake collected while building one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildErrors(Vec<BuildError>);

impl BuildErrors {
    pub(crate) fn new(errors: Vec<BuildError>) -> Self {
        Self(errors)
    }

    /// The individual errors, in the order they were made
    pub fn errors(&self) -> &[BuildError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, error: &BuildError) -> bool {
        self.0.contains(error)
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} query build error(s): ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_errors_display_lists_all() {
        let errs = BuildErrors::new(vec![
            BuildError::OrWithoutPrecedingCondition,
            BuildError::UnclosedBrackets(2),
        ]);
        let msg = errs.to_string();
        assert!(msg.starts_with("2 query build error(s)"));
        assert!(msg.contains("or() must follow"));
        assert!(msg.contains("2 bracket(s) left open"));
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_comparator_error_from_value_error() {
        let err: ComparatorError = ValueError::TypeMismatch {
            expected: "int",
            found: "string",
        }
        .into();
        assert!(matches!(err, ComparatorError::TypeMismatch(_)));
        assert!(err.to_string().contains("expected int"));
    }

    #[test]
    fn test_not_implemented_display() {
        let err = ComparatorError::NotImplemented {
            kind: Comparison::Like,
            type_name: "int",
        };
        assert_eq!(err.to_string(), "comparison LIKE not implemented for int");
    }
}
