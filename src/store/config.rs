//! Store configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default.
//!
//! ```json
//! {
//!   "index_identifier": true,
//!   "default_btree_max_children": 32,
//!   "full_scan_ratio": 1.0,
//!   "log_severity": "info"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigResult};
use crate::index::MIN_MAX_CHILDREN;
use crate::observability::{Logger, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Register a unique hash index on the identifier at construction
    #[serde(default = "default_index_identifier")]
    pub index_identifier: bool,

    /// Order of B-tree indexes created through `Store::add_btree_index`
    #[serde(default = "default_btree_max_children")]
    pub default_btree_max_children: usize,

    /// Preselection falls back to a full scan once the candidate count
    /// reaches this share of all records
    #[serde(default = "default_full_scan_ratio")]
    pub full_scan_ratio: f64,

    /// Minimum severity for loggers built from this config
    #[serde(default = "default_log_severity")]
    pub log_severity: Severity,
}

fn default_index_identifier() -> bool {
    true
}
fn default_btree_max_children() -> usize {
    32
}
fn default_full_scan_ratio() -> f64 {
    1.0
}
fn default_log_severity() -> Severity {
    Severity::Info
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_identifier: default_index_identifier(),
            default_btree_max_children: default_btree_max_children(),
            full_scan_ratio: default_full_scan_ratio(),
            log_severity: default_log_severity(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON document
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: StoreConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_btree_max_children < MIN_MAX_CHILDREN {
            return Err(ConfigError::Invalid(format!(
                "default_btree_max_children must be >= {}, got {}",
                MIN_MAX_CHILDREN, self.default_btree_max_children
            )));
        }

        if !(self.full_scan_ratio > 0.0 && self.full_scan_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "full_scan_ratio must be in (0, 1], got {}",
                self.full_scan_ratio
            )));
        }

        Ok(())
    }

    /// Logger writing to stderr at `log_severity`
    pub fn logger(&self) -> Logger {
        Logger::stderr(self.log_severity)
    }
}
