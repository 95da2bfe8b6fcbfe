//! The classified log event delivered to the ingestion endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity assigned by the classifier.
///
/// Single matching lines are `Error`; aggregated multi-line tracebacks are
/// `Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// One classified, deliverable log record.
///
/// Produced by a classifier, owned by the event queue, consumed exactly once
/// by the batch sender (or dropped before consumption under overload).
/// Serializes to the intake's JSON shape; `log` may contain literal newlines
/// for aggregated tracebacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    /// Event creation time (UTC), serialized as RFC 3339.
    pub timestamp: DateTime<Utc>,
    /// Identifier of the monitored source (container name).
    pub source: String,
    /// Message text; joined traceback lines keep their original order.
    pub log: String,
    pub severity: Severity,
    /// Identifier of the monitor instance that observed the line.
    pub host: String,
}

impl LogEvent {
    pub fn new(source: &str, host: &str, log: String, severity: Severity) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            source: source.to_string(),
            log,
            severity,
            host: host.to_string(),
        }
    }
}
