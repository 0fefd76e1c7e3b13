//! Probe module for health checks.
//!
//! A probe is one HTTP GET against the monitored URL. Failing to get a
//! response is an observation, not an error.

mod http;

pub use http::*;

use std::time::Duration;
use thiserror::Error;

/// Status recorded when no response could be obtained at all.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What a single probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: u16,
    pub description: String,
    pub response_time: String,
    pub body: String,
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: String,
    pub timeout: Duration,
    /// Truncate response bodies to this many bytes
    pub max_body_bytes: Option<usize>,
}

/// Format a probe duration for display and storage.
pub fn format_response_time(elapsed: Duration) -> String {
    format!("{:?}", elapsed)
}
