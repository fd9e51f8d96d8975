//! Observable events for memdex
//!
//! Events are explicit and typed. Every log line emitted by the store or
//! the executor names one of these.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Store constructed
    StoreCreated,
    /// Index registered (and backfilled)
    IndexAdded,

    // Writes
    /// Record inserted
    RecordInserted,
    /// Existing record replaced by upsert
    RecordUpdated,
    /// Record removed
    RecordDeleted,

    // Preselection
    /// Candidates narrowed through indexes
    PreselectIndexed,
    /// Index information absent or useless, every record scanned
    PreselectFullScan,

    // Queries
    /// Query executed successfully
    QueryComplete,
    /// Query rejected because of builder errors
    QueryRejected,
    /// Comparator failure during execution
    QueryFailed,
    /// Caller cancelled the query
    QueryCancelled,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreCreated => "STORE_CREATED",
            Event::IndexAdded => "INDEX_ADDED",

            Event::RecordInserted => "RECORD_INSERTED",
            Event::RecordUpdated => "RECORD_UPDATED",
            Event::RecordDeleted => "RECORD_DELETED",

            Event::PreselectIndexed => "PRESELECT_INDEXED",
            Event::PreselectFullScan => "PRESELECT_FULL_SCAN",

            Event::QueryComplete => "QUERY_COMPLETE",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryFailed => "QUERY_FAILED",
            Event::QueryCancelled => "QUERY_CANCELLED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::StoreCreated | Event::IndexAdded => Severity::Info,
            Event::RecordInserted
            | Event::RecordUpdated
            | Event::RecordDeleted
            | Event::PreselectIndexed
            | Event::PreselectFullScan
            | Event::QueryComplete => Severity::Trace,
            Event::QueryRejected | Event::QueryCancelled => Severity::Warn,
            Event::QueryFailed => Severity::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
