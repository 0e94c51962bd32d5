//! Structured JSON logger for stratadb
//!
//! One log line per event, written synchronously with no buffering.
//! Keys are emitted in deterministic order: `event` and `severity` first,
//! then the caller's fields sorted alphabetically.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation.
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

/// Synchronous structured logger.
pub struct Logger;

impl Logger {
    /// Logs an event to stdout.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, String)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stdout());
    }

    /// Logs an event to stderr (for errors).
    pub fn log_stderr(severity: Severity, event: &str, fields: &[(&str, String)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stderr());
    }

    /// Writes one JSON log line to the given writer.
    fn log_to_writer<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, String)],
        writer: &mut W,
    ) {
        let mut output = String::with_capacity(256);
        output.push('{');
        output.push_str(&format!(
            "\"event\":\"{}\",\"severity\":\"{}\"",
            escape(event),
            severity.as_str()
        ));

        let mut sorted: Vec<&(&str, String)> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in sorted {
            output.push_str(&format!(",\"{}\":\"{}\"", escape(key), escape(value)));
        }

        output.push('}');
        output.push('\n');

        // Logging must never take the engine down
        let _ = writer.write_all(output.as_bytes());
        let _ = writer.flush();
    }
}

/// Escapes a string for embedding in a JSON value.
fn escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                escaped.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => escaped.push(c),
        }
    }
    escaped
}
