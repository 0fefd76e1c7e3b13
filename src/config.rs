//! Configuration module for healthwatch.
//!
//! Every option is a command-line flag that can also be set through a
//! `HEALTHWATCH_*` environment variable.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::probe::ProbeConfig;
use crate::threshold::Thresholds;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("url must not be empty")]
    MissingUrl,
    #[error("{name} must be a positive number of seconds, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },
    #[error("interval ({interval:?}) must be greater than or equal to timeout ({timeout:?})")]
    IntervalShorterThanTimeout { interval: Duration, timeout: Duration },
    #[error("topic names must not be empty")]
    EmptyTopic,
}

/// Health check configuration.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "healthwatch",
    about = "Periodically checks an HTTP endpoint and reports when it goes down or recovers",
    version
)]
pub struct MonitorConfig {
    /// Name of the service used in notifications (default: the URL)
    #[arg(long, env = "HEALTHWATCH_NAME")]
    pub name: Option<String>,

    /// URL of the web service to monitor
    #[arg(long, env = "HEALTHWATCH_URL")]
    pub url: String,

    /// Path to the SQLite database file
    #[arg(long, env = "HEALTHWATCH_DB_PATH", default_value = "healthwatch.db")]
    pub db_path: PathBuf,

    /// Table storing the latest result per URL
    #[arg(long, env = "HEALTHWATCH_TABLE_NAME", default_value = "healthchecker_results")]
    pub table_name: String,

    /// Consecutive failures tolerated before a down notification
    #[arg(long, env = "HEALTHWATCH_FAILURE_THRESHOLD", default_value_t = 5)]
    pub failure_threshold: u32,

    /// Consecutive successes required before a recovered notification
    #[arg(long, env = "HEALTHWATCH_SUCCESS_THRESHOLD", default_value_t = 3)]
    pub success_threshold: u32,

    /// Seconds between health checks
    #[arg(long, env = "HEALTHWATCH_INTERVAL", default_value_t = 10.0)]
    pub interval: f64,

    /// Probe timeout in seconds
    #[arg(long, env = "HEALTHWATCH_TIMEOUT", default_value_t = 1.0)]
    pub timeout: f64,

    /// Number of checks to run (0 = run until interrupted)
    #[arg(long, env = "HEALTHWATCH_COUNT", default_value_t = 0)]
    pub count: u64,

    /// Webhook receiving markdown notifications as {"text": ...}
    #[arg(long, env = "HEALTHWATCH_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// NATS server used for topic notifications
    #[arg(long, env = "HEALTHWATCH_NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// Topics receiving plain-text notifications (comma separated)
    #[arg(long, env = "HEALTHWATCH_TOPICS", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Keep at most this many bytes of each response body
    #[arg(long, env = "HEALTHWATCH_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,

    /// File overriding the markdown notification template
    #[arg(long, env = "HEALTHWATCH_MARKDOWN_TEMPLATE")]
    pub markdown_template: Option<PathBuf>,

    /// File overriding the plain-text notification template
    #[arg(long, env = "HEALTHWATCH_PLAIN_TEMPLATE")]
    pub plain_template: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "HEALTHWATCH_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HEALTHWATCH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl MonitorConfig {
    /// Reject configurations that cannot run, before any check is scheduled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        let interval = self.interval()?;
        let timeout = self.timeout()?;
        if interval < timeout {
            return Err(ConfigError::IntervalShorterThanTimeout { interval, timeout });
        }
        if self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::EmptyTopic);
        }
        Ok(())
    }

    /// The display name, falling back to the URL.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.url,
        }
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        seconds("interval", self.interval)
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        seconds("timeout", self.timeout)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            success: self.success_threshold,
            failure: self.failure_threshold,
        }
    }

    pub fn probe_config(&self) -> Result<ProbeConfig, ConfigError> {
        Ok(ProbeConfig {
            url: self.url.clone(),
            timeout: self.timeout()?,
            max_body_bytes: self.max_body_bytes,
        })
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::InvalidDuration { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { name, value })
}
