/// Errors surfaced to the binary when constructing or running the monitor.
///
/// Runtime failures inside the pipeline (delivery failures, queue drops,
/// source restarts) are never propagated as errors; they are logged and
/// converted into retry/drop/restart behavior at their origin.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid {name} pattern: {source}")]
    InvalidPattern {
        name: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Shutdown grace period exceeded; abandoning unfinished tasks")]
    ShutdownTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MonitorError::InvalidConfig("no sources configured".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: no sources configured"
        );
    }

    #[test]
    fn test_pattern_error_names_the_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let error = MonitorError::InvalidPattern {
            name: "error",
            source,
        };
        assert!(error.to_string().contains("error pattern"));
    }
}
