//! Monitor configuration.
//!
//! Every knob is supplied at construction: [`Config::from_env`] reads the
//! process environment, [`Config::default`] carries the stock deployment
//! values, and [`Config::validate`] rejects configurations the pipeline
//! cannot run with before any task is spawned.

use std::env;
use std::time::Duration;

use crate::classifier::LinePatterns;
use crate::error::MonitorError;

const DEFAULT_ERROR_PATTERN: &str = r"(?i)(error|exception|critical|fail)";
const DEFAULT_TRACEBACK_PATTERN: &str = r"^Traceback \(most recent call last\):";
/// Heuristic for "this looks like the start of a fresh log line": a leading
/// date, wall-clock time, bracketed tag, or severity token.
const DEFAULT_LOG_LINE_PATTERN: &str =
    r"^(\d{4}-\d{2}-\d{2}[T ]|\d{2}:\d{2}:\d{2}|\[|(TRACE|DEBUG|INFO|WARN|WARNING|ERROR|CRITICAL|FATAL)\b)";

const DEFAULT_BRIDGE_PHRASES: [&str; 3] = [
    "Caused by",
    "During handling of the above exception",
    "The above exception was the direct cause",
];

const DEFAULT_INGEST_URL: &str = "http://openobserve:5080/api/default/logs/_json";

/// Configuration for the log monitor pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifiers of the monitored sources (container names).
    pub sources: Vec<String>,
    /// Pattern marking a single line as an error event.
    pub error_pattern: String,
    /// Pattern opening a multi-line traceback.
    pub traceback_pattern: String,
    /// Pattern recognizing the start of an independent log line; while a
    /// traceback is open, lines NOT matching it are assumed to belong to it.
    pub log_line_pattern: String,
    /// Prefixes that bridge otherwise-terminating lines into an open traceback.
    pub bridge_phrases: Vec<String>,
    /// Force-flush threshold for a buffered traceback.
    pub traceback_max_lines: usize,
    /// Ingestion endpoint accepting a JSON array of events.
    pub ingest_url: String,
    pub ingest_user: Option<String>,
    pub ingest_password: Option<String>,
    /// Event queue capacity; enqueues beyond it are dropped, never blocked on.
    pub queue_max_size: usize,
    /// Maximum events per delivered batch.
    pub batch_max_size: usize,
    /// Batch assembly window, measured from the first item's arrival.
    pub batch_max_interval: Duration,
    /// Delivery attempts per batch before the batch is dropped.
    pub max_send_retries: u32,
    /// Initial retry backoff; doubled after every failed attempt.
    pub send_base_backoff: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Startup reachability gate: total wait and poll interval.
    pub boot_timeout: Duration,
    pub boot_poll: Duration,
    /// Fixed delay before re-opening a failed source stream.
    pub restart_delay: Duration,
    /// Identifier of this monitor instance, attached to every event.
    pub host: String,
    /// Diagnostic log level for the agent itself.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            error_pattern: DEFAULT_ERROR_PATTERN.to_string(),
            traceback_pattern: DEFAULT_TRACEBACK_PATTERN.to_string(),
            log_line_pattern: DEFAULT_LOG_LINE_PATTERN.to_string(),
            bridge_phrases: DEFAULT_BRIDGE_PHRASES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            traceback_max_lines: 100,
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            ingest_user: None,
            ingest_password: None,
            queue_max_size: 2000,
            batch_max_size: 50,
            batch_max_interval: Duration::from_secs(1),
            max_send_retries: 6,
            send_base_backoff: Duration::from_secs_f64(1.5),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(5),
            boot_timeout: Duration::from_secs(120),
            boot_poll: Duration::from_secs(2),
            restart_delay: Duration::from_secs(3),
            host: detect_hostname(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables, validated.
    pub fn from_env() -> Result<Self, MonitorError> {
        let defaults = Config::default();

        let config = Self {
            sources: env_list("MONITOR_SOURCES"),
            error_pattern: env_string("ERROR_PATTERN", defaults.error_pattern),
            traceback_pattern: env_string("TRACEBACK_PATTERN", defaults.traceback_pattern),
            log_line_pattern: env_string("LOG_LINE_PATTERN", defaults.log_line_pattern),
            bridge_phrases: env_phrase_list("BRIDGE_PHRASES", defaults.bridge_phrases),
            traceback_max_lines: env_parse("TRACEBACK_MAX_LINES", defaults.traceback_max_lines),
            ingest_url: env_string("INGEST_URL", defaults.ingest_url),
            ingest_user: env::var("INGEST_USER").ok().filter(|v| !v.is_empty()),
            ingest_password: env::var("INGEST_PASSWORD").ok().filter(|v| !v.is_empty()),
            queue_max_size: env_parse("QUEUE_MAX_SIZE", defaults.queue_max_size),
            batch_max_size: env_parse("BATCH_MAX_SIZE", defaults.batch_max_size),
            batch_max_interval: env_secs("BATCH_MAX_INTERVAL", defaults.batch_max_interval),
            max_send_retries: env_parse("MAX_SEND_RETRIES", defaults.max_send_retries),
            send_base_backoff: env_secs("SEND_BASE_BACKOFF", defaults.send_base_backoff),
            connect_timeout: env_secs("CONNECT_TIMEOUT", defaults.connect_timeout),
            read_timeout: env_secs("READ_TIMEOUT", defaults.read_timeout),
            boot_timeout: env_secs("INGEST_BOOT_TIMEOUT", defaults.boot_timeout),
            boot_poll: env_secs("INGEST_BOOT_POLL", defaults.boot_poll),
            restart_delay: env_secs("SOURCE_RESTART_DELAY", defaults.restart_delay),
            host: env_string("MONITOR_HOST", defaults.host),
            log_level: env_string("LOG_LEVEL", defaults.log_level).to_lowercase(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.sources.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "no sources configured; set MONITOR_SOURCES".to_string(),
            ));
        }
        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(MonitorError::InvalidConfig(
                "source identifiers must be non-empty".to_string(),
            ));
        }

        if self.queue_max_size == 0 {
            return Err(MonitorError::InvalidConfig(
                "queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.batch_max_size == 0 {
            return Err(MonitorError::InvalidConfig(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if self.traceback_max_lines == 0 {
            return Err(MonitorError::InvalidConfig(
                "traceback line limit must be greater than 0".to_string(),
            ));
        }
        if self.max_send_retries == 0 {
            return Err(MonitorError::InvalidConfig(
                "at least one delivery attempt is required".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(MonitorError::InvalidConfig(format!(
                "invalid log level '{}'; must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        // Patterns must compile and the endpoint must be addressable before
        // any task starts.
        LinePatterns::compile(self)?;
        self.endpoint_addr()?;

        Ok(())
    }

    /// Host and port of the ingestion endpoint, for the reachability probe.
    pub fn endpoint_addr(&self) -> Result<(String, u16), MonitorError> {
        let url = url::Url::parse(&self.ingest_url)
            .map_err(|e| MonitorError::InvalidConfig(format!("invalid ingest URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                MonitorError::InvalidConfig("ingest URL is missing a host".to_string())
            })?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });
        Ok((host, port))
    }

    /// Basic-auth credentials, present only when both halves are configured.
    pub fn ingest_auth(&self) -> Option<(&str, &str)> {
        match (self.ingest_user.as_deref(), self.ingest_password.as_deref()) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }
}

fn env_string(key: &str, fallback: String) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or(fallback)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_phrase_list(key: &str, fallback: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .split(';')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => fallback,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(fallback)
}

fn env_secs(key: &str, fallback: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(fallback)
}

/// Detect this monitor instance's hostname: `HOSTNAME` env var first (set in
/// containers), then the gethostname syscall, then a fixed fallback.
fn detect_hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    if let Ok(hostname) = nix::unistd::gethostname() {
        if let Some(hostname) = hostname.to_str() {
            if !hostname.is_empty() {
                return hostname.to_string();
            }
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            sources: vec!["web-1".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_with_sources_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_sources() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_source() {
        let config = Config {
            sources: vec!["web-1".to_string(), "  ".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacities() {
        for mutate in [
            (|c: &mut Config| c.queue_max_size = 0) as fn(&mut Config),
            |c| c.batch_max_size = 0,
            |c| c.traceback_max_lines = 0,
            |c| c.max_send_retries = 0,
        ] {
            let mut config = test_config();
            mutate(&mut config);
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let config = Config {
            error_pattern: "(".to_string(),
            ..test_config()
        };
        match config.validate() {
            Err(MonitorError::InvalidPattern { name, .. }) => assert_eq!(name, "error"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = Config {
            ingest_url: "not a url".to_string(),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_addr_scheme_defaults() {
        let config = Config {
            ingest_url: "https://ingest.example.com/api/default/logs/_json".to_string(),
            ..test_config()
        };
        assert_eq!(
            config.endpoint_addr().unwrap(),
            ("ingest.example.com".to_string(), 443)
        );

        let config = Config {
            ingest_url: "http://ingest.example.com:5080/api".to_string(),
            ..test_config()
        };
        assert_eq!(
            config.endpoint_addr().unwrap(),
            ("ingest.example.com".to_string(), 5080)
        );
    }

    #[test]
    fn test_ingest_auth_requires_both_halves() {
        let mut config = test_config();
        assert!(config.ingest_auth().is_none());

        config.ingest_user = Some("admin@example.com".to_string());
        assert!(config.ingest_auth().is_none());

        config.ingest_password = Some("hunter2".to_string());
        assert_eq!(config.ingest_auth(), Some(("admin@example.com", "hunter2")));
    }
}
