//! Executor error types
//!
//! Error codes:
//! - MEMDEX_QUERY_INVALID (ERROR)
//! - MEMDEX_EXECUTION_FAILED (ERROR)
//! - MEMDEX_QUERY_CANCELLED (WARNING)

use std::fmt;

use crate::query::{BuildErrors, ComparatorError};

/// Severity levels for executor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller-initiated stop; nothing is wrong with the query
    Warning,
    /// The query could not produce a result
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Executor error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    /// The query carries builder errors
    QueryInvalid,
    /// A comparator failed during preselection or filtering
    ExecutionFailed,
    /// The cancellation token fired during the scan
    Cancelled,
}

impl ExecutorErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::QueryInvalid => "MEMDEX_QUERY_INVALID",
            ExecutorErrorCode::ExecutionFailed => "MEMDEX_EXECUTION_FAILED",
            ExecutorErrorCode::Cancelled => "MEMDEX_QUERY_CANCELLED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            ExecutorErrorCode::Cancelled => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Underlying cause, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cause {
    Build(BuildErrors),
    Comparator(ComparatorError),
    None,
}

/// Executor error type with full context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    message: String,
    cause: Cause,
}

impl ExecutorError {
    /// The query was built with mistakes
    pub fn query_invalid(errors: BuildErrors) -> Self {
        Self {
            code: ExecutorErrorCode::QueryInvalid,
            message: errors.to_string(),
            cause: Cause::Build(errors),
        }
    }

    /// A comparator failed; the scan stopped at the first failure
    pub fn execution_failed(err: ComparatorError) -> Self {
        Self {
            code: ExecutorErrorCode::ExecutionFailed,
            message: format!("execute query: {}", err),
            cause: Cause::Comparator(err),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            code: ExecutorErrorCode::Cancelled,
            message: "query cancelled".to_string(),
            cause: Cause::None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ExecutorErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ExecutorErrorCode::Cancelled
    }

    /// Builder errors, for `QueryInvalid`
    pub fn build_errors(&self) -> Option<&BuildErrors> {
        match &self.cause {
            Cause::Build(errors) => Some(errors),
            _ => None,
        }
    }

    /// The failing comparator's error, for `ExecutionFailed`
    pub fn comparator_error(&self) -> Option<&ComparatorError> {
        match &self.cause {
            Cause::Comparator(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Cause::Build(errors) => Some(errors),
            Cause::Comparator(err) => Some(err),
            Cause::None => None,
        }
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
