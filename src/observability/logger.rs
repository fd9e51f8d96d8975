//! Structured JSON logger
//!
//! - One log line = one event
//! - Deterministic key ordering
//! - Explicit severity levels
//! - Synchronous, no buffering
//!
//! The logger is an explicit value handed to the store at construction.
//! There is no process-wide default instance.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Per-record detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where log lines go
enum Sink {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
    Discard,
}

/// A structured logger that outputs JSON lines
pub struct Logger {
    sink: Mutex<Sink>,
    min_severity: Severity,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("min_severity", &self.min_severity)
            .finish_non_exhaustive()
    }
}

impl Logger {
    fn with_sink(sink: Sink, min_severity: Severity) -> Self {
        Self {
            sink: Mutex::new(sink),
            min_severity,
        }
    }

    /// Logger writing to stdout
    pub fn stdout(min_severity: Severity) -> Self {
        Self::with_sink(Sink::Stdout, min_severity)
    }

    /// Logger writing to stderr
    pub fn stderr(min_severity: Severity) -> Self {
        Self::with_sink(Sink::Stderr, min_severity)
    }

    /// Logger that drops every line
    pub fn discard() -> Self {
        Self::with_sink(Sink::Discard, Severity::Error)
    }

    /// Logger capturing lines into a shared buffer.
    ///
    /// Returns the logger and a handle to read captured output.
    pub fn buffered(min_severity: Severity) -> (Self, LogBuffer) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let logger = Self::with_sink(Sink::Buffer(Arc::clone(&buffer)), min_severity);
        (logger, LogBuffer { inner: buffer })
    }

    /// Minimum severity that is emitted
    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Whether a line at `severity` would be written
    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, String)]) {
        if !self.enabled(severity) {
            return;
        }

        let line = format_line(severity, event, fields);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // Logging must never fail the caller.
        let _ = match &mut *sink {
            Sink::Stdout => write_line(&mut io::stdout().lock(), &line),
            Sink::Stderr => write_line(&mut io::stderr().lock(), &line),
            Sink::Buffer(buffer) => {
                let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                write_line(&mut *buffer, &line)
            }
            Sink::Discard => Ok(()),
        };
    }

    /// Log at TRACE level
    pub fn trace(&self, event: &str, fields: &[(&str, String)]) {
        self.log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(&self, event: &str, fields: &[(&str, String)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: &str, fields: &[(&str, String)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: &str, fields: &[(&str, String)]) {
        self.log(Severity::Error, event, fields);
    }
}

/// Read handle for a buffered logger
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Captured output as text
    pub fn contents(&self) -> String {
        let buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Captured lines parsed as JSON objects
    pub fn lines(&self) -> Vec<Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.flush()
}

/// Renders one JSON line. `event` and `severity` are reserved keys;
/// caller fields are sorted alphabetically after them.
fn format_line(severity: Severity, event: &str, fields: &[(&str, String)]) -> String {
    let sorted: BTreeMap<&str, &str> = fields
        .iter()
        .filter(|(k, _)| *k != "event" && *k != "severity")
        .map(|(k, v)| (*k, v.as_str()))
        .collect();

    let mut line = String::with_capacity(128);
    line.push_str("{\"event\":");
    line.push_str(&Value::from(event).to_string());
    line.push_str(",\"severity\":");
    line.push_str(&Value::from(severity.as_str()).to_string());
    for (key, value) in sorted {
        line.push(',');
        line.push_str(&Value::from(key).to_string());
        line.push(':');
        line.push_str(&Value::from(value).to_string());
    }
    line.push_str("}\n");
    line
}
