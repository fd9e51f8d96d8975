//! Value conversion errors

use thiserror::Error;

/// Result type for value conversions
pub type ValueResult<T> = Result<T, ValueError>;

/// Failure to read a dynamic operand as a concrete field type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Operand has a different type than the field
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Operand has the right type but does not fit the field's range
    #[error("value {value} out of range for {expected}")]
    OutOfRange { expected: &'static str, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValueError::TypeMismatch {
            expected: "int",
            found: "string",
        };
        assert_eq!(err.to_string(), "type mismatch: expected int, found string");

        let err = ValueError::OutOfRange {
            expected: "u32",
            value: -1,
        };
        assert!(err.to_string().contains("out of range"));
    }
}
