//! Observability subsystem for memdex
//!
//! Provides:
//! - Structured logging (JSON lines) through an explicit `Logger` instance
//! - Typed lifecycle and query events
//! - Lock-free operational counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No background threads, no globals
//! 4. Deterministic output

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{LogBuffer, Logger, Severity};
pub use metrics::{MetricsSnapshot, StoreMetrics};

/// Log a typed event at its own severity
pub fn log_event(logger: &Logger, event: Event, fields: &[(&str, String)]) {
    logger.log(event.severity(), event.as_str(), fields);
}
