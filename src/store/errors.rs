//! Store and configuration errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for store writes
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Insert of an identifier that is already stored
    #[error("record {0} already exists")]
    RecordExists(i64),

    /// Identifier 0 is reserved
    #[error("record identifier must be non-zero")]
    InvalidIdentifier,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
