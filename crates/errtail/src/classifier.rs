//! Line classification and traceback aggregation.
//!
//! A [`Classifier`] instance is private to one source reader. It consumes the
//! source's raw lines in order and emits [`LogEvent`]s: single matching lines
//! as `error`, aggregated multi-line tracebacks as one `fatal` event. All
//! patterns are injected via [`Config`] and compiled once, so deployments can
//! tune them without rebuilding.

use std::sync::Arc;

use regex::Regex;

use crate::config::Config;
use crate::error::MonitorError;
use crate::event::{LogEvent, Severity};

/// Compiled classification patterns, shared by every classifier instance.
#[derive(Debug)]
pub struct LinePatterns {
    /// A single line containing an error worth forwarding.
    error: Regex,
    /// A line opening a multi-line traceback.
    traceback_start: Regex,
    /// A line that looks like the start of a fresh, independently-stamped log
    /// line. While buffering, anything NOT matching this is presumed to still
    /// belong to the open traceback.
    log_line: Regex,
    /// Prefixes that chain otherwise-terminating lines into an open traceback.
    bridge_phrases: Vec<String>,
}

impl LinePatterns {
    pub fn compile(config: &Config) -> Result<Arc<Self>, MonitorError> {
        let compile = |name: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|source| MonitorError::InvalidPattern { name, source })
        };

        Ok(Arc::new(LinePatterns {
            error: compile("error", &config.error_pattern)?,
            traceback_start: compile("traceback-start", &config.traceback_pattern)?,
            log_line: compile("log-line", &config.log_line_pattern)?,
            bridge_phrases: config.bridge_phrases.clone(),
        }))
    }
}

/// Stateful per-source line classifier.
///
/// Two states: idle, and buffering an open traceback (non-empty `buffer`).
/// The buffer belongs to one stream session; the reader calls [`finish`]
/// when the underlying stream ends.
///
/// [`finish`]: Classifier::finish
pub struct Classifier {
    patterns: Arc<LinePatterns>,
    source: String,
    host: String,
    max_traceback_lines: usize,
    buffer: Vec<String>,
}

impl Classifier {
    pub fn new(patterns: Arc<LinePatterns>, config: &Config, source: &str) -> Self {
        Classifier {
            patterns,
            source: source.to_string(),
            host: config.host.clone(),
            max_traceback_lines: config.traceback_max_lines,
            buffer: Vec::new(),
        }
    }

    /// Feed one raw line; returns the events it completes, in order.
    ///
    /// A line terminating an open traceback can produce two events: the
    /// flushed `fatal` traceback followed by the line's own classification.
    pub fn push_line(&mut self, line: &str) -> Vec<LogEvent> {
        let mut events = Vec::new();

        if !self.buffer.is_empty() {
            if self.is_continuation(line) {
                self.buffer.push(line.to_string());
                if self.buffer.len() >= self.max_traceback_lines {
                    tracing::debug!(
                        source = %self.source,
                        lines = self.buffer.len(),
                        "traceback reached line limit, force-flushing"
                    );
                    events.push(self.flush_traceback());
                }
                return events;
            }
            // Non-continuation closes the traceback; the current line is then
            // re-evaluated from the idle state below.
            events.push(self.flush_traceback());
        }

        if self.patterns.traceback_start.is_match(line) {
            self.buffer.push(line.to_string());
            if self.buffer.len() >= self.max_traceback_lines {
                events.push(self.flush_traceback());
            }
        } else if self.patterns.error.is_match(line) {
            events.push(LogEvent::new(
                &self.source,
                &self.host,
                line.to_string(),
                Severity::Error,
            ));
        }

        events
    }

    /// Flush any open traceback at end of stream.
    pub fn finish(&mut self) -> Option<LogEvent> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.flush_traceback())
        }
    }

    fn flush_traceback(&mut self) -> LogEvent {
        let message = self.buffer.join("\n");
        self.buffer.clear();
        LogEvent::new(&self.source, &self.host, message, Severity::Fatal)
    }

    /// Does `line` extend the open traceback?
    fn is_continuation(&self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        if self
            .patterns
            .bridge_phrases
            .iter()
            .any(|phrase| line.starts_with(phrase.as_str()))
        {
            return true;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            return true;
        }
        // Nested traceback inside the open one.
        if self.patterns.traceback_start.is_match(line) {
            return true;
        }
        // Default-in: only a line that clearly looks like a fresh log line
        // closes the buffer.
        !self.patterns.log_line.is_match(line)
    }
}
